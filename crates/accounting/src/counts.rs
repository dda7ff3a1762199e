use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use worldgrid_common::{LandData, UserId};
use worldgrid_scene::SceneObject;

/// Which ownership bucket of a parcel an object falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    Owner,
    Group,
    Others,
}

/// Derived counts for one parcel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelCounts {
    pub owner: usize,
    pub group: usize,
    pub others: usize,
    /// Parts contributed by each object owner.
    pub users: BTreeMap<UserId, usize>,
}

impl ParcelCounts {
    pub fn total(&self) -> usize {
        self.owner + self.group + self.others
    }

    pub(crate) fn add(&mut self, bucket: Bucket, owner: UserId, parts: usize) {
        *self.users.entry(owner).or_insert(0) += parts;
        match bucket {
            Bucket::Owner => self.owner += parts,
            Bucket::Group => self.group += parts,
            Bucket::Others => self.others += parts,
        }
    }
}

/// Classify `object` against the ownership of `land`.
///
/// On group-deeded land the group itself is the owner, so objects deeded to
/// the group land in the owner bucket.
///
/// The nil group means "no group" and never matches. A bare equality test
/// would count an ungrouped object on an ungrouped parcel as Group; here it
/// counts as Others.
pub fn classify(land: &LandData, object: &SceneObject) -> Bucket {
    let parcel_owner = if land.is_group_owned {
        UserId::from_group(land.group_id)
    } else {
        land.owner_id
    };
    if object.owner_id == parcel_owner {
        Bucket::Owner
    } else if !land.group_id.is_nil() && object.group_id == land.group_id {
        Bucket::Group
    } else {
        Bucket::Others
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use worldgrid_common::{GroupId, ParcelId};

    #[test]
    fn individually_owned_parcel() {
        let owner = UserId::new();
        let group = GroupId::new();
        let land = LandData {
            group_id: group,
            ..LandData::new(ParcelId::new(), owner)
        };

        let mine = SceneObject::new(owner, Vec3::ZERO);
        assert_eq!(classify(&land, &mine), Bucket::Owner);

        let mut member = SceneObject::new(UserId::new(), Vec3::ZERO);
        member.group_id = group;
        assert_eq!(classify(&land, &member), Bucket::Group);

        let stranger = SceneObject::new(UserId::new(), Vec3::ZERO);
        assert_eq!(classify(&land, &stranger), Bucket::Others);
    }

    #[test]
    fn group_owned_parcel_treats_group_as_owner() {
        let group = GroupId::new();
        let land = LandData {
            group_id: group,
            is_group_owned: true,
            ..LandData::new(ParcelId::new(), UserId::from_group(group))
        };

        let deeded = SceneObject::new(UserId::from_group(group), Vec3::ZERO);
        assert_eq!(classify(&land, &deeded), Bucket::Owner);

        let mut member = SceneObject::new(UserId::new(), Vec3::ZERO);
        member.group_id = group;
        assert_eq!(classify(&land, &member), Bucket::Group);
    }

    #[test]
    fn nil_group_is_not_a_shared_group() {
        let land = LandData::new(ParcelId::new(), UserId::new());
        let other = SceneObject::new(UserId::new(), Vec3::ZERO);
        assert!(land.group_id.is_nil() && other.group_id.is_nil());
        assert_eq!(classify(&land, &other), Bucket::Others);
    }

    #[test]
    fn add_tracks_users_and_buckets() {
        let mut counts = ParcelCounts::default();
        let u = UserId::new();
        counts.add(Bucket::Owner, u, 3);
        counts.add(Bucket::Others, u, 2);
        assert_eq!(counts.owner, 3);
        assert_eq!(counts.others, 2);
        assert_eq!(counts.users[&u], 5);
        assert_eq!(counts.total(), 5);
    }
}
