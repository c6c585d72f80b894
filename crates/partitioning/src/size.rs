// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Size tokens for fdisk's last-sector prompt
//!
//! fdisk reads `+<n><unit>` as "allocate exactly this much from the first sector",
//! and an empty answer as "use all remaining space".

use std::{fmt, str::FromStr};

use crate::Error;

/// Binary size suffixes understood by fdisk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SizeUnit {
    /// Kibibytes
    Kibibytes = 1024,
    /// Mebibytes
    Mebibytes = 1024 * 1024,
    /// Gibibytes
    Gibibytes = 1024 * 1024 * 1024,
    /// Tebibytes
    Tebibytes = 1024 * 1024 * 1024 * 1024,
    /// Pebibytes
    Pebibytes = 1024 * 1024 * 1024 * 1024 * 1024,
}

impl SizeUnit {
    /// The suffix fdisk expects
    pub fn suffix(&self) -> char {
        match self {
            Self::Kibibytes => 'K',
            Self::Mebibytes => 'M',
            Self::Gibibytes => 'G',
            Self::Tebibytes => 'T',
            Self::Pebibytes => 'P',
        }
    }

    fn from_suffix(suffix: char) -> Option<Self> {
        match suffix {
            'K' => Some(Self::Kibibytes),
            'M' => Some(Self::Mebibytes),
            'G' => Some(Self::Gibibytes),
            'T' => Some(Self::Tebibytes),
            'P' => Some(Self::Pebibytes),
            _ => None,
        }
    }

    /// The next smaller unit, if any
    fn smaller(&self) -> Option<Self> {
        match self {
            Self::Kibibytes => None,
            Self::Mebibytes => Some(Self::Kibibytes),
            Self::Gibibytes => Some(Self::Mebibytes),
            Self::Tebibytes => Some(Self::Gibibytes),
            Self::Pebibytes => Some(Self::Tebibytes),
        }
    }
}

/// The size of a partition to create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSpec {
    /// Exactly this much, starting at the first sector
    Exact { amount: u64, unit: SizeUnit },
    /// All remaining space on the device
    Remaining,
}

impl SizeSpec {
    pub fn exact(amount: u64, unit: SizeUnit) -> Self {
        Self::Exact { amount, unit }
    }

    pub fn gibibytes(amount: u64) -> Self {
        Self::exact(amount, SizeUnit::Gibibytes)
    }

    pub fn is_remaining(&self) -> bool {
        matches!(self, Self::Remaining)
    }

    /// Size in bytes, `None` for remaining space
    pub fn bytes(&self) -> Option<u64> {
        match self {
            Self::Exact { amount, unit } => amount.checked_mul(*unit as u64),
            Self::Remaining => None,
        }
    }

    /// Converts a human readable lsblk size (`512M`, `476.9G`, `1.8T`) into an exact
    /// size. Fractional amounts are floored into the next smaller unit.
    pub fn from_lsblk(size: &str) -> Option<Self> {
        let size = size.trim();
        let suffix = size.chars().last()?;
        let value: f64 = size[..size.len() - suffix.len_utf8()].parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }

        // Plain bytes, round down into kibibytes
        if suffix == 'B' {
            return Some(Self::exact((value / 1024.0).floor() as u64, SizeUnit::Kibibytes));
        }

        let unit = SizeUnit::from_suffix(suffix)?;
        if value.fract() == 0.0 {
            return Some(Self::exact(value as u64, unit));
        }
        match unit.smaller() {
            Some(smaller) => Some(Self::exact((value * 1024.0).floor() as u64, smaller)),
            None => Some(Self::exact(value.floor() as u64, unit)),
        }
    }
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact { amount, unit } => write!(f, "+{amount}{}", unit.suffix()),
            Self::Remaining => Ok(()),
        }
    }
}

impl FromStr for SizeSpec {
    type Err = Error;

    /// Parses an fdisk size token, the inverse of `Display`
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.is_empty() {
            return Ok(Self::Remaining);
        }

        let invalid = || Error::InvalidSize(value.to_owned());
        let body = value.strip_prefix('+').ok_or_else(invalid)?;
        let suffix = body.chars().last().ok_or_else(invalid)?;
        let unit = SizeUnit::from_suffix(suffix).ok_or_else(invalid)?;
        let digits = &body[..body.len() - suffix.len_utf8()];
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let amount = digits.parse().map_err(|_| invalid())?;

        Ok(Self::Exact { amount, unit })
    }
}
