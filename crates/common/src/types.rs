use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// The all-zero id, used where the grid protocol sends "no owner".
            pub const NIL: Self = Self(Uuid::nil());

            /// A fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::NIL
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Identity of a region, stable across restarts and moves.
    RegionId
);
uuid_id!(
    /// Identity of an avatar agent (root or child).
    AgentId
);
uuid_id!(
    /// Identity of a scene object group.
    ObjectId
);
uuid_id!(
    /// Global identity of a parcel.
    ParcelId
);
uuid_id!(
    /// Identity of a user account; owners of parcels and objects.
    UserId
);
uuid_id!(
    /// Identity of a group; parcels may be deeded to one.
    GroupId
);

impl UserId {
    /// Group-deeded objects and parcels report the group id as their owner.
    pub fn from_group(group: GroupId) -> Self {
        Self(group.0)
    }
}

impl From<AgentId> for UserId {
    fn from(agent: AgentId) -> Self {
        Self(agent.0)
    }
}
