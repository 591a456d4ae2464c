//! Signal tables and forwarding policy.
//!
//! Signal numbers differ between architectures, so each supported platform
//! carries its own name to number table. The forwarding policy decides which
//! signals received by a proxy are passed on to the contained process.

mod proxy;

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use bastion_common::{BastionError, BastionResult};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub use proxy::{ProcessTarget, SignalProxy, SignalTarget, proxy_signals};

/// Number of named offsets from each end of the real-time range.
const RT_NAMED_OFFSETS: i32 = 15;

const LINUX_SIGNALS: &[(&str, i32)] = &[
    ("ABRT", 6),
    ("ALRM", 14),
    ("BUS", 7),
    ("CHLD", 17),
    ("CLD", 17),
    ("CONT", 18),
    ("FPE", 8),
    ("HUP", 1),
    ("ILL", 4),
    ("INT", 2),
    ("IO", 29),
    ("IOT", 6),
    ("KILL", 9),
    ("PIPE", 13),
    ("POLL", 29),
    ("PROF", 27),
    ("PWR", 30),
    ("QUIT", 3),
    ("SEGV", 11),
    ("STKFLT", 16),
    ("STOP", 19),
    ("SYS", 31),
    ("TERM", 15),
    ("TRAP", 5),
    ("TSTP", 20),
    ("TTIN", 21),
    ("TTOU", 22),
    ("URG", 23),
    ("USR1", 10),
    ("USR2", 12),
    ("VTALRM", 26),
    ("WINCH", 28),
    ("XCPU", 24),
    ("XFSZ", 25),
];

const MIPS_SIGNALS: &[(&str, i32)] = &[
    ("ABRT", 6),
    ("ALRM", 14),
    ("BUS", 10),
    ("CHLD", 18),
    ("CLD", 18),
    ("CONT", 25),
    ("EMT", 7),
    ("FPE", 8),
    ("HUP", 1),
    ("ILL", 4),
    ("INT", 2),
    ("IO", 22),
    ("IOT", 6),
    ("KILL", 9),
    ("PIPE", 13),
    ("POLL", 22),
    ("PROF", 29),
    ("PWR", 19),
    ("QUIT", 3),
    ("SEGV", 11),
    ("STOP", 23),
    ("SYS", 12),
    ("TERM", 15),
    ("TRAP", 5),
    ("TSTP", 24),
    ("TTIN", 26),
    ("TTOU", 27),
    ("URG", 21),
    ("USR1", 16),
    ("USR2", 17),
    ("VTALRM", 28),
    ("WINCH", 20),
    ("XCPU", 30),
    ("XFSZ", 31),
];

/// Signals a proxy never forwards: child reaping, broken pipes and urgent
/// I/O are meant for the proxy itself, and STOP cannot be caught.
const SUPPRESSED: &[&str] = &["CHLD", "PIPE", "URG", "STOP"];

/// Signal numbering of a Linux architecture family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalPlatform {
    /// Generic Linux numbering (x86, arm, riscv, ...).
    Linux,
    /// MIPS numbering.
    #[serde(rename = "mips")]
    LinuxMips,
}

impl SignalPlatform {
    /// The platform this binary was built for.
    #[must_use]
    pub const fn host() -> Self {
        if cfg!(any(target_arch = "mips", target_arch = "mips64")) {
            Self::LinuxMips
        } else {
            Self::Linux
        }
    }

    const fn base_signals(self) -> &'static [(&'static str, i32)] {
        match self {
            Self::Linux => LINUX_SIGNALS,
            Self::LinuxMips => MIPS_SIGNALS,
        }
    }

    /// Real-time signal range.
    #[must_use]
    pub const fn rt_range(self) -> RangeInclusive<i32> {
        match self {
            Self::Linux => 34..=64,
            Self::LinuxMips => 34..=127,
        }
    }

    /// Name to number table of this platform.
    #[must_use]
    pub fn table(self) -> &'static SignalTable {
        match self {
            Self::Linux => &*LINUX_TABLE,
            Self::LinuxMips => &*MIPS_TABLE,
        }
    }
}

impl fmt::Display for SignalPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Linux => "linux",
            Self::LinuxMips => "mips",
        })
    }
}

static LINUX_TABLE: Lazy<SignalTable> = Lazy::new(|| SignalTable::build(SignalPlatform::Linux));
static MIPS_TABLE: Lazy<SignalTable> = Lazy::new(|| SignalTable::build(SignalPlatform::LinuxMips));

/// Canonical uppercase signal names, without the `SIG` prefix, mapped to
/// their numbers. Aliases such as `CLD` and `IOT` share a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SignalTable {
    signals: BTreeMap<String, i32>,
    #[serde(skip)]
    suppressed: Vec<i32>,
    #[serde(skip)]
    max: i32,
}

impl SignalTable {
    fn build(platform: SignalPlatform) -> Self {
        let mut signals: BTreeMap<String, i32> = platform
            .base_signals()
            .iter()
            .map(|(name, number)| ((*name).to_string(), *number))
            .collect();

        let range = platform.rt_range();
        let (rtmin, rtmax) = (*range.start(), *range.end());
        signals.insert("RTMIN".to_string(), rtmin);
        signals.insert("RTMAX".to_string(), rtmax);
        for offset in 1..=RT_NAMED_OFFSETS {
            signals.insert(format!("RTMIN+{offset}"), rtmin + offset);
            if offset < RT_NAMED_OFFSETS {
                signals.insert(format!("RTMAX-{offset}"), rtmax - offset);
            }
        }

        let suppressed = SUPPRESSED.iter().filter_map(|name| signals.get(*name).copied()).collect();

        Self {
            signals,
            suppressed,
            max: rtmax,
        }
    }

    /// Number of a signal name. Accepts `SIG` prefixes and any case.
    #[must_use]
    pub fn number(&self, name: &str) -> Option<i32> {
        let name = name.trim().to_ascii_uppercase();
        let name = name.strip_prefix("SIG").unwrap_or(&name);
        self.signals.get(name).copied()
    }

    /// Canonical name of a signal number. Aliases lose to the name that
    /// sorts first.
    #[must_use]
    pub fn name(&self, number: i32) -> Option<&str> {
        self.signals
            .iter()
            .find(|(_, n)| **n == number)
            .map(|(name, _)| name.as_str())
    }

    /// Parse a signal given as a number or a name.
    ///
    /// # Errors
    ///
    /// Returns [`BastionError::InvalidSignal`] for unknown names and numbers
    /// outside `1..=` the highest real-time signal.
    pub fn parse(&self, raw: &str) -> BastionResult<i32> {
        let invalid = || BastionError::InvalidSignal {
            signal: raw.to_string(),
        };

        match raw.trim().parse::<i32>() {
            Ok(number) if (1..=self.max).contains(&number) => Ok(number),
            Ok(_) => Err(invalid()),
            Err(_) => self.number(raw).ok_or_else(invalid),
        }
    }

    /// Decide whether a proxy forwards `number`.
    #[must_use]
    pub fn classify(&self, number: i32) -> SignalDecision {
        if self.suppressed.contains(&number) {
            SignalDecision::Suppress
        } else {
            SignalDecision::Forward
        }
    }

    /// Iterate over `(name, number)` entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> + '_ {
        self.signals.iter().map(|(name, number)| (name.as_str(), *number))
    }

    /// Distinct signal numbers, ascending.
    #[must_use]
    pub fn numbers(&self) -> Vec<i32> {
        let mut numbers: Vec<i32> = self.signals.values().copied().collect();
        numbers.sort_unstable();
        numbers.dedup();
        numbers
    }

    /// Number of entries, aliases included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

/// What a proxy does with a received signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDecision {
    /// Deliver to the contained process.
    Forward,
    /// Drop.
    Suppress,
}

impl fmt::Display for SignalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Forward => "forward",
            Self::Suppress => "suppress",
        })
    }
}

/// Signal table of `platform`.
#[must_use]
pub fn signal_table(platform: SignalPlatform) -> &'static SignalTable {
    platform.table()
}

/// Classify a host signal number.
#[must_use]
pub fn classify_signal(number: i32) -> SignalDecision {
    SignalPlatform::host().table().classify(number)
}

/// Parse a host signal given as a number or a name.
///
/// # Errors
///
/// Returns [`BastionError::InvalidSignal`] if the signal is unknown.
pub fn parse_signal(raw: &str) -> BastionResult<i32> {
    SignalPlatform::host().table().parse(raw)
}
