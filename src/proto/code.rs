//! Closed packet code tables for both directions.
//!
//! Codes are encoded as uvarint. A value outside the table of the sending
//! side is always a fatal protocol violation.
use std::fmt;

use super::Buffer;
use crate::error::Error;

macro_rules! packet_codes {
    ($(#[$meta:meta])* $name:ident, $side:literal { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($variant = $value),+
        }

        impl $name {
            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }

            pub fn encode(self, b: &mut Buffer) {
                b.put_uvarint(self as u64);
            }
        }

        impl TryFrom<u64> for $name {
            type Error = Error;

            fn try_from(code: u64) -> Result<Self, Self::Error> {
                match code {
                    $($value => Ok($name::$variant),)+
                    code => Err(Error::BadPacketCode { side: $side, code }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

packet_codes! {
    /// Packets sent by the client.
    ClientCode, "client" {
        Hello = 0,
        Query = 1,
        Data = 2,
        Cancel = 3,
        Ping = 4,
        TablesStatusRequest = 5,
        KeepAlive = 6,
        Scalar = 7,
        IgnoredPartUUIDs = 8,
        ReadTaskResponse = 9,
        MergeTreeReadTaskResponse = 10,
        SSHChallengeRequest = 11,
        SSHChallengeResponse = 12,
    }
}

packet_codes! {
    /// Packets sent by the server.
    ServerCode, "server" {
        Hello = 0,
        Data = 1,
        Exception = 2,
        Progress = 3,
        Pong = 4,
        EndOfStream = 5,
        ProfileInfo = 6,
        Totals = 7,
        Extremes = 8,
        TablesStatusResponse = 9,
        Log = 10,
        TableColumns = 11,
        PartUUIDs = 12,
        ReadTaskRequest = 13,
        ProfileEvents = 14,
        MergeTreeAllRangesAnnouncement = 15,
        MergeTreeReadTaskRequest = 16,
        TimezoneUpdate = 17,
        SSHChallenge = 18,
    }
}
