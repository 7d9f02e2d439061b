//! Process id newtype.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A positive operating-system process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(u32);

impl Pid {
    /// Wraps a raw id. Zero is never a valid process id.
    pub fn new(raw: u32) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// The id as a signed `pid_t`, if it fits.
    ///
    /// Values above `i32::MAX` would address process groups or "all
    /// processes" when handed to `kill(2)`, so they are rejected.
    pub fn as_raw(self) -> Option<i32> {
        i32::try_from(self.0).ok().filter(|raw| *raw > 0)
    }

    /// Id of the calling process.
    pub fn current() -> Self {
        Self(std::process::id())
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Pid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: u32 = s
            .trim()
            .parse()
            .map_err(|_| format!("not a process id: {:?}", s.trim()))?;
        Pid::new(raw).ok_or_else(|| "process id must be positive".to_string())
    }
}
