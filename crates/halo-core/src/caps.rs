//! Accelerator classes and capability masks.
//!
//! Discovery requests carry a [`CapabilityMask`] naming the accelerator
//! classes the application wants; each backend declares a single
//! [`AcceleratorClass`]. Backends whose class is not covered by the
//! requested mask are left untouched by discovery.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, Result};

/// The device class a backend serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcceleratorClass {
    /// Discrete GPU-class accelerator.
    DiscreteGpu,
    /// Integrated GPU-class accelerator.
    IntegratedGpu,
    /// Secondary accelerator class (NPU and similar offload engines).
    Npu,
    /// Any class the loader does not model; matched only by an
    /// all-classes request.
    Other,
}

impl AcceleratorClass {
    /// The mask bit selecting this class, empty for [`Other`].
    ///
    /// [`Other`]: AcceleratorClass::Other
    pub fn mask_bit(self) -> CapabilityMask {
        match self {
            AcceleratorClass::DiscreteGpu => CapabilityMask::DISCRETE_GPU,
            AcceleratorClass::IntegratedGpu => CapabilityMask::INTEGRATED_GPU,
            AcceleratorClass::Npu => CapabilityMask::NPU,
            AcceleratorClass::Other => CapabilityMask::empty(),
        }
    }
}

impl fmt::Display for AcceleratorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcceleratorClass::DiscreteGpu => "discrete-gpu",
            AcceleratorClass::IntegratedGpu => "integrated-gpu",
            AcceleratorClass::Npu => "npu",
            AcceleratorClass::Other => "other",
        };
        write!(f, "{name}")
    }
}

impl FromStr for AcceleratorClass {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discrete" | "discrete-gpu" | "gpu" => Ok(AcceleratorClass::DiscreteGpu),
            "integrated" | "integrated-gpu" => Ok(AcceleratorClass::IntegratedGpu),
            "npu" => Ok(AcceleratorClass::Npu),
            "other" => Ok(AcceleratorClass::Other),
            other => Err(LoaderError::InvalidEnumeration(format!(
                "unknown accelerator class `{other}`"
            ))),
        }
    }
}

/// A bitmask of requested accelerator classes.
///
/// The all-ones pattern is the "everything" request and matches every
/// class, including [`AcceleratorClass::Other`]. Any other value carrying
/// bits outside the named set is rejected as an invalid enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityMask(u32);

impl CapabilityMask {
    /// Request discrete GPU-class backends.
    pub const DISCRETE_GPU: CapabilityMask = CapabilityMask(1 << 0);
    /// Request integrated GPU-class backends.
    pub const INTEGRATED_GPU: CapabilityMask = CapabilityMask(1 << 1);
    /// Request NPU-class backends.
    pub const NPU: CapabilityMask = CapabilityMask(1 << 2);
    /// Request every backend class.
    pub const ALL: CapabilityMask = CapabilityMask(u32::MAX);

    const KNOWN_BITS: u32 = (1 << 0) | (1 << 1) | (1 << 2);

    /// The empty mask; matches nothing.
    pub const fn empty() -> Self {
        CapabilityMask(0)
    }

    /// Construct a mask from raw bits without validation.
    pub const fn from_bits(bits: u32) -> Self {
        CapabilityMask(bits)
    }

    /// The raw bit pattern.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if no class is requested.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True for the all-classes request.
    pub const fn is_all(self) -> bool {
        self.0 == u32::MAX
    }

    /// True if every bit of `other` is present in `self`.
    pub const fn contains(self, other: CapabilityMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if a backend of the given class satisfies this request.
    pub fn matches_class(self, class: AcceleratorClass) -> bool {
        if self.is_all() {
            return true;
        }
        let bit = class.mask_bit();
        !bit.is_empty() && self.contains(bit)
    }

    /// Reject masks carrying unknown bits.
    ///
    /// The exact all-ones pattern is accepted as "everything"; any other
    /// value must stay within the named bits.
    pub fn validate(self) -> Result<()> {
        if self.is_all() || self.0 & !Self::KNOWN_BITS == 0 {
            Ok(())
        } else {
            Err(LoaderError::InvalidEnumeration(format!(
                "unknown capability bits {:#010x}",
                self.0 & !Self::KNOWN_BITS
            )))
        }
    }
}

impl BitOr for CapabilityMask {
    type Output = CapabilityMask;

    fn bitor(self, rhs: CapabilityMask) -> CapabilityMask {
        CapabilityMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for CapabilityMask {
    fn bitor_assign(&mut self, rhs: CapabilityMask) {
        self.0 |= rhs.0;
    }
}

impl Default for CapabilityMask {
    fn default() -> Self {
        CapabilityMask::ALL
    }
}

impl fmt::Display for CapabilityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return write!(f, "all");
        }
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut first = true;
        for (bit, name) in [
            (Self::DISCRETE_GPU, "discrete-gpu"),
            (Self::INTEGRATED_GPU, "integrated-gpu"),
            (Self::NPU, "npu"),
        ] {
            if self.contains(bit) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}
