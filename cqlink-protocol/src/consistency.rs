#![warn(missing_docs)]
//! The module contains Rust representation of replica consistency levels.
use crate::error;
use crate::frame::{FromBytes, FromCursor, Serialize, Version};
use crate::types::*;
use derive_more::Display;
use std::convert::{From, TryFrom, TryInto};
use std::default::Default;
use std::io;
use std::str::FromStr;

/// `Consistency` is an enum which represents the number (or distribution) of replicas which must
/// acknowledge a read or a write for it to succeed. Wire values are fixed by the protocol.
#[derive(Debug, PartialEq, Clone, Copy, Display, Ord, PartialOrd, Eq, Hash, Default)]
#[non_exhaustive]
pub enum Consistency {
    /// A write succeeds even if all replicas are down, after a hinted handoff. Writes only.
    Any,
    /// At least one replica must respond.
    #[default]
    One,
    /// At least two replicas must respond.
    Two,
    /// At least three replicas must respond.
    Three,
    /// A quorum of replicas across all data centers must respond.
    Quorum,
    /// All replicas of the partition must respond.
    All,
    /// A quorum of replicas in the coordinator's data center must respond.
    LocalQuorum,
    /// A quorum of replicas in every data center must respond.
    EachQuorum,
    /// Linearizable consistency for lightweight transactions.
    Serial,
    /// Same as `Serial`, confined to the local data center.
    LocalSerial,
    /// At least one replica in the local data center must respond.
    LocalOne,
}

impl FromStr for Consistency {
    type Err = error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let consistency = match s {
            "Any" | "ANY" => Consistency::Any,
            "One" | "ONE" => Consistency::One,
            "Two" | "TWO" => Consistency::Two,
            "Three" | "THREE" => Consistency::Three,
            "Quorum" | "QUORUM" => Consistency::Quorum,
            "All" | "ALL" => Consistency::All,
            "LocalQuorum" | "LOCAL_QUORUM" => Consistency::LocalQuorum,
            "EachQuorum" | "EACH_QUORUM" => Consistency::EachQuorum,
            "Serial" | "SERIAL" => Consistency::Serial,
            "LocalSerial" | "LOCAL_SERIAL" => Consistency::LocalSerial,
            "LocalOne" | "LOCAL_ONE" => Consistency::LocalOne,
            _ => {
                return Err(error::Error::General(format!(
                    "Invalid consistency provided: {s}"
                )))
            }
        };

        Ok(consistency)
    }
}

impl Serialize for Consistency {
    fn serialize(&self, cursor: &mut io::Cursor<&mut Vec<u8>>, version: Version) {
        let value: i16 = (*self).into();
        value.serialize(cursor, version)
    }
}

impl TryFrom<CIntShort> for Consistency {
    type Error = error::Error;

    fn try_from(value: CIntShort) -> Result<Self, Self::Error> {
        match value {
            0x0000 => Ok(Consistency::Any),
            0x0001 => Ok(Consistency::One),
            0x0002 => Ok(Consistency::Two),
            0x0003 => Ok(Consistency::Three),
            0x0004 => Ok(Consistency::Quorum),
            0x0005 => Ok(Consistency::All),
            0x0006 => Ok(Consistency::LocalQuorum),
            0x0007 => Ok(Consistency::EachQuorum),
            0x0008 => Ok(Consistency::Serial),
            0x0009 => Ok(Consistency::LocalSerial),
            0x000A => Ok(Consistency::LocalOne),
            _ => Err(Self::Error::UnknownConsistency(value)),
        }
    }
}

impl From<Consistency> for CIntShort {
    fn from(value: Consistency) -> Self {
        match value {
            Consistency::Any => 0x0000,
            Consistency::One => 0x0001,
            Consistency::Two => 0x0002,
            Consistency::Three => 0x0003,
            Consistency::Quorum => 0x0004,
            Consistency::All => 0x0005,
            Consistency::LocalQuorum => 0x0006,
            Consistency::EachQuorum => 0x0007,
            Consistency::Serial => 0x0008,
            Consistency::LocalSerial => 0x0009,
            Consistency::LocalOne => 0x000A,
        }
    }
}

impl FromBytes for Consistency {
    fn from_bytes(bytes: &[u8]) -> error::Result<Consistency> {
        try_i16_from_bytes(bytes)
            .map_err(Into::into)
            .and_then(TryInto::try_into)
    }
}

impl FromCursor for Consistency {
    fn from_cursor(cursor: &mut io::Cursor<&[u8]>, version: Version) -> error::Result<Consistency> {
        CIntShort::from_cursor(cursor, version).and_then(TryInto::try_into)
    }
}

impl Consistency {
    /// Does this consistency require local dc.
    #[inline]
    pub fn is_dc_local(self) -> bool {
        matches!(
            self,
            Consistency::LocalOne | Consistency::LocalQuorum | Consistency::LocalSerial
        )
    }

    /// Is this a serial (lightweight transaction) consistency.
    #[inline]
    pub fn is_serial(self) -> bool {
        matches!(self, Consistency::Serial | Consistency::LocalSerial)
    }

    /// Returns the strongest fixed-count consistency which can be satisfied by the given number of
    /// replicas, or `None` if no replica is available.
    pub fn for_replica_count(replicas: CInt) -> Option<Consistency> {
        match replicas {
            r if r >= 3 => Some(Consistency::Three),
            2 => Some(Consistency::Two),
            1 => Some(Consistency::One),
            _ => None,
        }
    }

    /// Number of replicas a fixed-count consistency requires. Levels whose requirement depends on
    /// the replication factor return `None`.
    pub fn fixed_replica_count(self) -> Option<CInt> {
        match self {
            Consistency::Any => Some(0),
            Consistency::One | Consistency::LocalOne => Some(1),
            Consistency::Two => Some(2),
            Consistency::Three => Some(3),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::traits::{FromBytes, FromCursor};
    use std::io::Cursor;

    #[test]
    fn test_consistency_serialize() {
        assert_eq!(Consistency::Any.serialize_to_vec(Version::V4), &[0, 0]);
        assert_eq!(Consistency::One.serialize_to_vec(Version::V4), &[0, 1]);
        assert_eq!(Consistency::Two.serialize_to_vec(Version::V4), &[0, 2]);
        assert_eq!(Consistency::Three.serialize_to_vec(Version::V4), &[0, 3]);
        assert_eq!(Consistency::Quorum.serialize_to_vec(Version::V4), &[0, 4]);
        assert_eq!(Consistency::All.serialize_to_vec(Version::V4), &[0, 5]);
        assert_eq!(
            Consistency::LocalQuorum.serialize_to_vec(Version::V4),
            &[0, 6]
        );
        assert_eq!(
            Consistency::EachQuorum.serialize_to_vec(Version::V4),
            &[0, 7]
        );
        assert_eq!(Consistency::Serial.serialize_to_vec(Version::V4), &[0, 8]);
        assert_eq!(
            Consistency::LocalSerial.serialize_to_vec(Version::V4),
            &[0, 9]
        );
        assert_eq!(
            Consistency::LocalOne.serialize_to_vec(Version::V4),
            &[0, 10]
        );
    }

    #[test]
    fn test_consistency_from_bytes() {
        assert_eq!(Consistency::from_bytes(&[0, 0]).unwrap(), Consistency::Any);
        assert_eq!(
            Consistency::from_bytes(&[0, 4]).unwrap(),
            Consistency::Quorum
        );
        assert_eq!(
            Consistency::from_bytes(&[0, 9]).unwrap(),
            Consistency::LocalSerial
        );
        assert!(Consistency::from_bytes(&[0, 11]).is_err());
    }

    #[test]
    fn test_consistency_from_cursor() {
        assert_eq!(
            Consistency::from_cursor(&mut Cursor::new(&[0, 7]), Version::V4).unwrap(),
            Consistency::EachQuorum
        );
        assert_eq!(
            Consistency::from_cursor(&mut Cursor::new(&[0, 8]), Version::V4).unwrap(),
            Consistency::Serial
        );
    }

    #[test]
    fn test_consistency_from_str() {
        assert_eq!(
            "LOCAL_QUORUM".parse::<Consistency>().unwrap(),
            Consistency::LocalQuorum
        );
        assert_eq!("Two".parse::<Consistency>().unwrap(), Consistency::Two);
        assert!("MOST".parse::<Consistency>().is_err());
    }

    #[test]
    fn test_for_replica_count() {
        assert_eq!(Consistency::for_replica_count(0), None);
        assert_eq!(Consistency::for_replica_count(1), Some(Consistency::One));
        assert_eq!(Consistency::for_replica_count(2), Some(Consistency::Two));
        assert_eq!(Consistency::for_replica_count(3), Some(Consistency::Three));
        assert_eq!(Consistency::for_replica_count(7), Some(Consistency::Three));
    }
}
