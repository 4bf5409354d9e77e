//! This module holds utilities for working with the members of a keep.
//!
//! Member order is significant: it is the order the factory selected them in,
//! and reward remainders always go to the last member.
use std::{collections::HashMap, ops::Index};

use serde::Serialize;

use crate::primitives::Address;

/// The most members a single keep can have.
pub const MAX_MEMBERS: usize = 16;

/// Represents the ordered, duplicate-free list of members of a keep.
#[derive(Debug, Clone, Serialize)]
pub struct MemberList {
    members: Vec<Address>,
    /// This maps each member to their index in the vector above.
    #[serde(skip_serializing)]
    indices: HashMap<Address, usize>,
}

impl MemberList {
    /// Create a member list from a slice of addresses.
    ///
    /// This will return None if the list is empty, too long, or has duplicates.
    pub fn new(members: &[Address]) -> Option<Self> {
        if members.is_empty() || members.len() > MAX_MEMBERS {
            return None;
        }

        let indices: HashMap<_, _> = members.iter().enumerate().map(|(i, m)| (*m, i)).collect();
        if indices.len() < members.len() {
            return None;
        }

        Some(Self {
            members: members.to_owned(),
            indices,
        })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if this list has a given member.
    pub fn contains(&self, member: Address) -> bool {
        self.indices.contains_key(&member)
    }

    /// Return the position of a member, if present.
    pub fn index(&self, member: Address) -> Option<usize> {
        self.indices.get(&member).copied()
    }

    pub fn as_slice(&self) -> &[Address] {
        &self.members
    }

    pub fn iter(&self) -> impl Iterator<Item = Address> + '_ {
        self.members.iter().copied()
    }

    /// Iterate over the members paired with their share of `amount`.
    ///
    /// Everyone gets `amount / n`, and the last member also gets the remainder.
    /// Returns None if the per-member share would be zero.
    pub fn split(&self, amount: u128) -> Option<impl Iterator<Item = (Address, u128)> + '_> {
        let n = self.members.len() as u128;
        let share = amount / n;
        if share == 0 {
            return None;
        }
        let last_share = amount - share * (n - 1);
        let last = self.members.len() - 1;
        Some(
            self.members
                .iter()
                .enumerate()
                .map(move |(i, m)| (*m, if i == last { last_share } else { share })),
        )
    }
}

/// A map from members to elements.
///
/// The idea is that you have at most one element for each member.
#[derive(Debug, Clone)]
pub struct MemberMap<T> {
    data: Vec<Option<T>>,
    count: usize,
}

impl<T> MemberMap<T> {
    /// Create an empty map sized for a list of members.
    pub fn new(members: &MemberList) -> Self {
        let data = (0..members.len()).map(|_| None).collect();
        Self { data, count: 0 }
    }

    /// Check if this map is full, i.e. if every member has put something in.
    pub fn full(&self) -> bool {
        self.count == self.data.len()
    }

    /// Check if this map contains data from a specific member.
    pub fn contains(&self, members: &MemberList, member: Address) -> bool {
        members
            .index(member)
            .map_or(false, |i| self.data[i].is_some())
    }

    pub fn get(&self, members: &MemberList, member: Address) -> Option<&T> {
        members.index(member).and_then(|i| self.data[i].as_ref())
    }

    /// Place the data for a member in this map.
    ///
    /// Returns false, leaving the map untouched, if the address is not a
    /// member or the member already has an entry.
    pub fn put(&mut self, members: &MemberList, member: Address, data: T) -> bool {
        let i = match members.index(member) {
            Some(i) => i,
            None => return false,
        };
        if self.data[i].is_some() {
            return false;
        }

        self.data[i] = Some(data);
        self.count += 1;
        true
    }

    /// Iterate over the entries present so far, in member order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.data.iter().flatten()
    }
}

impl Index<usize> for MemberList {
    type Output = Address;

    fn index(&self, index: usize) -> &Self::Output {
        &self.members[index]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn addrs(ids: &[u64]) -> Vec<Address> {
        ids.iter().map(|id| Address::from_low_u64(*id)).collect()
    }

    #[test]
    fn test_rejects_bad_lists() {
        assert!(MemberList::new(&[]).is_none());
        assert!(MemberList::new(&addrs(&[1, 2, 1])).is_none());
        let too_many: Vec<u64> = (0..17).collect();
        assert!(MemberList::new(&addrs(&too_many)).is_none());
        let max: Vec<u64> = (0..16).collect();
        assert!(MemberList::new(&addrs(&max)).is_some());
    }

    #[test]
    fn test_preserves_order() {
        let list = MemberList::new(&addrs(&[9, 3, 5])).unwrap();
        assert_eq!(list[0], Address::from_low_u64(9));
        assert_eq!(list.index(Address::from_low_u64(5)), Some(2));
        assert!(!list.contains(Address::from_low_u64(4)));
    }

    #[test]
    fn test_split_routes_remainder_to_last() {
        let list = MemberList::new(&addrs(&[1, 2, 3])).unwrap();
        let shares: Vec<u128> = list.split(1000).unwrap().map(|(_, v)| v).collect();
        assert_eq!(shares, vec![333, 333, 334]);
        assert!(list.split(2).is_none());
    }

    #[test]
    fn test_member_map() {
        let list = MemberList::new(&addrs(&[1, 2])).unwrap();
        let mut map = MemberMap::new(&list);
        assert!(map.put(&list, Address::from_low_u64(2), "b"));
        assert!(!map.put(&list, Address::from_low_u64(2), "again"));
        assert!(!map.put(&list, Address::from_low_u64(7), "stranger"));
        assert!(!map.full());
        assert!(map.put(&list, Address::from_low_u64(1), "a"));
        assert!(map.full());
        assert_eq!(map.values().copied().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map.get(&list, Address::from_low_u64(2)), Some(&"b"));
    }
}
