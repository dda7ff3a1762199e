use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::Vec3;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use worldgrid_accounting::ParcelAccountingCache;
use worldgrid_comms::{
    AgentCircuit, ChildAgentState, CommsConfig, FailureTracker, HttpPeerTransport, LivenessProbe,
    LocalBackend, RegionHandlers, RegionUpNotice, RemoteRegionGateway,
};
use worldgrid_common::{
    AgentId, GroupId, LandData, ObjectId, ParcelId, RegionDescriptor, RegionHandle, RegionId,
    UserId,
};
use worldgrid_directory::{HttpAuthority, RegionDirectory, StandaloneAuthority};
use worldgrid_scene::{LandChannel, LandView, Scene, SceneObject};

#[derive(Parser)]
#[command(name = "worldgrid-cli", about = "Operator tool for a worldgrid region server")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and the effective configuration
    Info,
    /// Convert grid coordinates to a region handle, or back
    Handle {
        x: Option<u32>,
        y: Option<u32>,
        /// Decode this handle instead
        #[arg(long)]
        decode: Option<u64>,
    },
    /// Check whether a host accepts TCP connections
    Probe {
        host: String,
        port: u16,
        /// Timeout in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },
    /// Look a region up through the grid authority
    Resolve {
        /// Region name
        #[arg(long, conflicts_with = "handle")]
        name: Option<String>,
        /// Region handle
        #[arg(long)]
        handle: Option<u64>,
    },
    /// List the regions bordering a grid location
    Neighbours { x: u32, y: u32 },
    /// Populate a region with objects and print per-parcel counts
    Accounting {
        /// Number of objects to rez
        #[arg(short, long, default_value = "24")]
        objects: usize,
    },
    /// Run a small in-process grid and exercise the gateway
    Demo,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = match &cli.config {
        Some(path) => CommsConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => CommsConfig::default(),
    };

    match cli.command {
        Commands::Info => {
            println!("worldgrid-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("grid authority: {}", config.grid_url);
            println!("logins enabled: {}", config.logins_enabled);
            let t = &config.timeouts;
            println!(
                "timeouts: register={:?} deregister={:?} query={:?} map={:?} land={:?} presence={:?} peer={:?} probe={:?}",
                t.directory.registration,
                t.directory.deregistration,
                t.directory.data_query,
                t.directory.map_block,
                t.land_data,
                t.presence,
                t.peer_rpc,
                t.probe
            );
            println!("failure thresholds: {:?}", config.failure_thresholds);
        }
        Commands::Handle { x, y, decode } => match (x, y, decode) {
            (_, _, Some(raw)) => {
                let (x, y) = RegionHandle(raw).to_location();
                println!("{raw} -> ({x}, {y})");
            }
            (Some(x), Some(y), None) => {
                let handle = RegionHandle::try_from_location(x, y)
                    .with_context(|| format!("({x}, {y}) is outside the grid"))?;
                println!("({x}, {y}) -> {handle}");
            }
            _ => anyhow::bail!("give both X and Y, or --decode HANDLE"),
        },
        Commands::Probe { host, port, timeout } => {
            let live = LivenessProbe::new(Duration::from_secs(timeout)).check(&host, port);
            println!("{host}:{port} {}", if live { "is reachable" } else { "is NOT reachable" });
            if !live {
                std::process::exit(1);
            }
        }
        Commands::Resolve { name, handle } => {
            let directory = http_directory(&config)?;
            let found = match (name, handle) {
                (Some(name), _) => directory.resolve_by_name(&name),
                (None, Some(raw)) => directory.resolve_by_handle(RegionHandle(raw)),
                (None, None) => anyhow::bail!("give --name or --handle"),
            };
            match found {
                Some(region) => print_region(&region),
                None => {
                    println!("not found");
                    std::process::exit(1);
                }
            }
        }
        Commands::Neighbours { x, y } => {
            let directory = http_directory(&config)?;
            let neighbours = directory.request_neighbours(x, y);
            println!("{} neighbour(s) of ({x}, {y})", neighbours.len());
            for region in &neighbours {
                print_region(region);
            }
        }
        Commands::Accounting { objects } => accounting_demo(objects)?,
        Commands::Demo => grid_demo(&config)?,
    }

    Ok(())
}

fn http_directory(config: &CommsConfig) -> anyhow::Result<RegionDirectory> {
    let authority = HttpAuthority::new(&config.grid_url)?;
    Ok(RegionDirectory::new(
        Arc::new(authority),
        config.send_key.clone(),
        config.recv_key.clone(),
    )
    .with_timeouts(config.timeouts.directory))
}

fn print_region(region: &RegionDescriptor) {
    println!(
        "  {} ({}, {}) handle={} id={} sim={} peer={} http={}",
        region.name,
        region.loc_x,
        region.loc_y,
        region.handle(),
        region.region_id,
        region.internal,
        region.peer_rpc,
        region.http_url()
    );
}

fn accounting_demo(objects: usize) -> anyhow::Result<()> {
    let estate_owner = UserId::new();
    let resident = UserId::new();
    let group = GroupId::new();

    let mut land = LandChannel::new(estate_owner);
    let mut west = LandData::new(ParcelId::new(), resident);
    west.name = "West".into();
    land.subdivide(west.clone(), 0.0, 0.0, 128.0, 256.0)?;
    let mut club = LandData::new(ParcelId::new(), UserId::from_group(group));
    club.name = "Club".into();
    club.group_id = group;
    club.is_group_owned = true;
    land.subdivide(club.clone(), 128.0, 0.0, 256.0, 64.0)?;

    let scene = Arc::new(RwLock::new(Scene::new()));
    let land = Arc::new(RwLock::new(land));
    let cache = ParcelAccountingCache::new(scene.clone(), land.clone());

    let owners = [estate_owner, resident, UserId::from_group(group), UserId::new()];
    for i in 0..objects {
        let x = (i * 37 % 256) as f32;
        let y = (i * 91 % 256) as f32;
        let mut object = SceneObject::new(owners[i % owners.len()], Vec3::new(x, y, 22.0));
        object.part_count = 1 + i % 3;
        if i % 5 == 0 {
            object.group_id = group;
        }
        let event = scene
            .write()
            .map_err(|_| anyhow::anyhow!("scene lock poisoned"))?
            .add(object);
        cache.apply_event(&event);
    }

    println!("{objects} object(s) rezzed");
    for parcel in land.all_parcels() {
        let counts = cache.prim_counts(parcel.global_id);
        println!(
            "  {:<12} owner={:<3} group={:<3} others={:<3} total={:<3} simulator={}",
            parcel.name,
            counts.owner(),
            counts.group(),
            counts.others(),
            counts.total(),
            counts.simulator()
        );
    }
    Ok(())
}

/// Region handlers backed by a land channel.
struct DemoRegion {
    name: String,
    land: RwLock<LandChannel>,
}

impl RegionHandlers for DemoRegion {
    fn expect_child_agent(&self, agent: &AgentCircuit) -> bool {
        println!("  [{}] expecting child agent {}", self.name, agent.agent_id);
        true
    }

    fn child_agent_update(&self, state: &ChildAgentState) -> bool {
        println!("  [{}] child agent {} at {}", self.name, state.agent_id, state.position);
        true
    }

    fn expect_avatar_crossing(&self, agent: AgentId, position: Vec3, _is_flying: bool) -> bool {
        println!("  [{}] avatar {agent} crossing in at {position}", self.name);
        true
    }

    fn expect_prim_crossing(&self, object: ObjectId, _payload: &str, _crossing_method: i32) -> bool {
        println!("  [{}] object {object} crossing in", self.name);
        true
    }

    fn close_child_connection(&self, agent: AgentId) -> bool {
        println!("  [{}] closing child agent {agent}", self.name);
        true
    }

    fn region_up(&self, neighbour: &RegionUpNotice) -> bool {
        println!(
            "  [{}] neighbour at ({}, {}) is up",
            self.name, neighbour.loc_x, neighbour.loc_y
        );
        true
    }

    fn land_data(&self, x: u32, y: u32) -> Option<LandData> {
        self.land.parcel_at(x as f32, y as f32)
    }
}

fn grid_demo(config: &CommsConfig) -> anyhow::Result<()> {
    let authority = Arc::new(StandaloneAuthority::new());
    let directory = RegionDirectory::new(authority, config.send_key.clone(), config.recv_key.clone())
        .with_timeouts(config.timeouts.directory);
    let gateway = RemoteRegionGateway::new(
        Arc::new(directory),
        Arc::new(FailureTracker::new()),
        Arc::new(LocalBackend::new()),
        Arc::new(HttpPeerTransport::new()?),
    )
    .with_timeouts(config.timeouts)
    .with_thresholds(config.failure_thresholds.clone());

    let alpha = RegionDescriptor::new(RegionId::new(), "Alpha", 1000, 1000, "127.0.0.1");
    let beta = RegionDescriptor::new(RegionId::new(), "Beta", 1000, 1001, "127.0.0.1");
    for region in [&alpha, &beta] {
        let handlers = Arc::new(DemoRegion {
            name: region.name.clone(),
            land: RwLock::new(LandChannel::new(UserId::new())),
        });
        gateway
            .attach_region(region.clone(), handlers)
            .with_context(|| format!("registering {}", region.name))?;
    }
    for (key, value) in gateway.directory().take_grid_settings() {
        println!("grid setting {key} = {value}");
    }

    let neighbours = gateway.directory().request_neighbours(alpha.loc_x, alpha.loc_y);
    println!("Alpha has {} neighbour(s)", neighbours.len());

    gateway.region_up(&alpha, beta.handle())?;
    let agent = AgentId::new();
    gateway.expect_child_agent(beta.handle(), &AgentCircuit::child(agent, 1))?;
    gateway.expect_avatar_crossing(beta.handle(), agent, Vec3::new(128.0, 1.0, 25.0), false)?;
    gateway.acknowledge_agent_crossed(beta.handle(), agent)?;
    gateway.close_child_connection(alpha.handle(), agent)?;

    if let Some(parcel) = gateway.request_land_data(beta.handle(), 128, 128)? {
        println!("Beta parcel at (128, 128): {} ({} m2)", parcel.name, parcel.area);
    }

    gateway.local().set_logins_enabled(false);
    match gateway.expect_child_agent(alpha.handle(), &AgentCircuit::child(AgentId::new(), 2)) {
        Ok(()) => println!("unexpected: login accepted while disabled"),
        Err(e) => println!("with logins disabled: {e}"),
    }

    for region in [&alpha, &beta] {
        gateway.detach_region(region);
    }
    Ok(())
}
