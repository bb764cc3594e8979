//! Numeric ids assigned by the build server.
//!
//! The server numbers executions, tasks and background jobs itself; the
//! client only ever echoes them back, so they are thin `u64` newtypes that
//! serialize as bare numbers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! server_id {
    ($name:ident, $label:literal) => {
        #[doc = concat!("Server-assigned ", $label, " id.")]
        #[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw id received from the server.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw numeric value.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $label, self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let digits = s
                    .strip_prefix(concat!($label, "#"))
                    .unwrap_or(s);
                digits.parse().map(Self)
            }
        }
    };
}

server_id!(ExecutionId, "execution");
server_id!(TaskId, "task");
server_id!(BackgroundJobId, "job");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_has_label() {
        assert_eq!(ExecutionId::new(7).to_string(), "execution#7");
        assert_eq!(TaskId::new(9).to_string(), "task#9");
        assert_eq!(BackgroundJobId::new(1).to_string(), "job#1");
    }

    #[test]
    fn parses_with_or_without_label() {
        assert_eq!("execution#12".parse::<ExecutionId>().unwrap(), ExecutionId::new(12));
        assert_eq!("12".parse::<ExecutionId>().unwrap(), ExecutionId::new(12));
        assert!("task#x".parse::<TaskId>().is_err());
    }

    #[test]
    fn serializes_as_bare_number() {
        let json = serde_json::to_string(&TaskId::new(42)).unwrap();
        assert_eq!(json, "42");
        let parsed: TaskId = serde_json::from_str("42").unwrap();
        assert_eq!(parsed.get(), 42);
    }

    #[test]
    fn ordering_follows_raw_value() {
        let mut ids = vec![ExecutionId::new(3), ExecutionId::new(1), ExecutionId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![ExecutionId::new(1), ExecutionId::new(2), ExecutionId::new(3)]);
    }
}
