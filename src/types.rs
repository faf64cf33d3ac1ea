//! Plain value types shared by the driver seam and the wrappers.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

use crate::error::{ClError, Result};

macro_rules! impl_bitfield {
    ($name:ident, $repr:ty) => {
        impl $name {
            /// Raw bit value.
            pub const fn bits(self) -> $repr {
                self.0
            }

            pub const fn from_bits(bits: $repr) -> Self {
                Self(bits)
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;

            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }
    };
}

/// `cl_device_type` bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceType(u64);

impl DeviceType {
    pub const DEFAULT: Self = Self(1 << 0);
    pub const CPU: Self = Self(1 << 1);
    pub const GPU: Self = Self(1 << 2);
    pub const ACCELERATOR: Self = Self(1 << 3);
    pub const CUSTOM: Self = Self(1 << 4);
    pub const ALL: Self = Self(0xFFFF_FFFF);
}

impl_bitfield!(DeviceType, u64);

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == DeviceType::ALL {
            return write!(f, "all");
        }
        let names = [
            (DeviceType::DEFAULT, "default"),
            (DeviceType::CPU, "cpu"),
            (DeviceType::GPU, "gpu"),
            (DeviceType::ACCELERATOR, "accelerator"),
            (DeviceType::CUSTOM, "custom"),
        ];
        let parts: Vec<&str> = names
            .iter()
            .filter(|(ty, _)| self.contains(*ty))
            .map(|(_, name)| *name)
            .collect();
        if parts.is_empty() {
            write!(f, "{:#x}", self.0)
        } else {
            write!(f, "{}", parts.join("|"))
        }
    }
}

impl FromStr for DeviceType {
    type Err = ClError;

    /// Parses `gpu`, `cpu|gpu`, `all`, ... (case-insensitive).
    fn from_str(s: &str) -> Result<Self> {
        let mut ty = DeviceType(0);
        for part in s.split('|').map(str::trim) {
            ty |= match part.to_ascii_lowercase().as_str() {
                "default" => DeviceType::DEFAULT,
                "cpu" => DeviceType::CPU,
                "gpu" => DeviceType::GPU,
                "accelerator" | "acc" => DeviceType::ACCELERATOR,
                "custom" => DeviceType::CUSTOM,
                "all" | "any" => DeviceType::ALL,
                other => {
                    return Err(ClError::Config(format!("unknown device type '{}'", other)));
                }
            };
        }
        Ok(ty)
    }
}

/// `cl_mem_flags` bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemFlags(u64);

impl MemFlags {
    pub const READ_WRITE: Self = Self(1 << 0);
    pub const WRITE_ONLY: Self = Self(1 << 1);
    pub const READ_ONLY: Self = Self(1 << 2);
    pub const USE_HOST_PTR: Self = Self(1 << 3);
    pub const ALLOC_HOST_PTR: Self = Self(1 << 4);
    pub const COPY_HOST_PTR: Self = Self(1 << 5);

    const ACCESS: Self = Self(0b111);

    /// Number of device-access flags set (at most one is legal).
    pub fn access_flag_count(self) -> u32 {
        (self.0 & Self::ACCESS.0).count_ones()
    }

    /// Whether the flags ask the driver to read host memory at creation.
    pub fn takes_host_data(self) -> bool {
        self.intersects(MemFlags::USE_HOST_PTR | MemFlags::COPY_HOST_PTR)
    }
}

impl_bitfield!(MemFlags, u64);

/// `cl_mem_object_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemObjectType {
    Buffer,
    Image2D,
    Image3D,
    Other(u32),
}

impl MemObjectType {
    pub fn from_code(code: u32) -> Self {
        match code {
            0x10F0 => MemObjectType::Buffer,
            0x10F1 => MemObjectType::Image2D,
            0x10F2 => MemObjectType::Image3D,
            other => MemObjectType::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            MemObjectType::Buffer => 0x10F0,
            MemObjectType::Image2D => 0x10F1,
            MemObjectType::Image3D => 0x10F2,
            MemObjectType::Other(code) => code,
        }
    }
}

/// `cl_addressing_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressingMode {
    None,
    #[default]
    ClampToEdge,
    Clamp,
    Repeat,
    MirroredRepeat,
}

impl AddressingMode {
    pub fn code(self) -> u32 {
        match self {
            AddressingMode::None => 0x1130,
            AddressingMode::ClampToEdge => 0x1131,
            AddressingMode::Clamp => 0x1132,
            AddressingMode::Repeat => 0x1133,
            AddressingMode::MirroredRepeat => 0x1134,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0x1130 => AddressingMode::None,
            0x1131 => AddressingMode::ClampToEdge,
            0x1132 => AddressingMode::Clamp,
            0x1133 => AddressingMode::Repeat,
            0x1134 => AddressingMode::MirroredRepeat,
            _ => return None,
        })
    }
}

/// `cl_filter_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

impl FilterMode {
    pub fn code(self) -> u32 {
        match self {
            FilterMode::Nearest => 0x1140,
            FilterMode::Linear => 0x1141,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0x1140 => Some(FilterMode::Nearest),
            0x1141 => Some(FilterMode::Linear),
            _ => None,
        }
    }
}

/// Parameters of `clCreateSampler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerDesc {
    pub normalized_coords: bool,
    pub addressing_mode: AddressingMode,
    pub filter_mode: FilterMode,
}

impl SamplerDesc {
    pub fn new(normalized_coords: bool, addressing_mode: AddressingMode, filter_mode: FilterMode) -> Self {
        Self {
            normalized_coords,
            addressing_mode,
            filter_mode,
        }
    }
}

/// `cl_build_status` for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStatus {
    Success,
    None,
    Error,
    InProgress,
}

impl BuildStatus {
    pub fn code(self) -> i32 {
        match self {
            BuildStatus::Success => 0,
            BuildStatus::None => -1,
            BuildStatus::Error => -2,
            BuildStatus::InProgress => -3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(BuildStatus::Success),
            -1 => Some(BuildStatus::None),
            -2 => Some(BuildStatus::Error),
            -3 => Some(BuildStatus::InProgress),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("gpu", DeviceType::GPU)]
    #[case("GPU", DeviceType::GPU)]
    #[case("cpu|gpu", DeviceType::CPU | DeviceType::GPU)]
    #[case(" accelerator ", DeviceType::ACCELERATOR)]
    #[case("all", DeviceType::ALL)]
    fn test_device_type_parse(#[case] input: &str, #[case] expected: DeviceType) {
        assert_eq!(input.parse::<DeviceType>().unwrap(), expected);
    }

    #[test]
    fn test_device_type_parse_rejects_unknown() {
        assert!(matches!(
            "fpga".parse::<DeviceType>(),
            Err(ClError::Config(_))
        ));
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(DeviceType::GPU.to_string(), "gpu");
        assert_eq!((DeviceType::CPU | DeviceType::GPU).to_string(), "cpu|gpu");
        assert_eq!(DeviceType::ALL.to_string(), "all");
    }

    #[test]
    fn test_mem_flags() {
        let flags = MemFlags::READ_ONLY | MemFlags::COPY_HOST_PTR;
        assert!(flags.contains(MemFlags::READ_ONLY));
        assert!(!flags.contains(MemFlags::WRITE_ONLY));
        assert!(flags.takes_host_data());
        assert_eq!(flags.access_flag_count(), 1);
        assert_eq!(flags.bits(), 0b100100);

        let conflicting = MemFlags::READ_ONLY | MemFlags::WRITE_ONLY;
        assert_eq!(conflicting.access_flag_count(), 2);
        assert!(MemFlags::default().is_empty());
    }

    #[test]
    fn test_sampler_codes() {
        for mode in [
            AddressingMode::None,
            AddressingMode::ClampToEdge,
            AddressingMode::Clamp,
            AddressingMode::Repeat,
            AddressingMode::MirroredRepeat,
        ] {
            assert_eq!(AddressingMode::from_code(mode.code()), Some(mode));
        }
        assert_eq!(FilterMode::from_code(0x1141), Some(FilterMode::Linear));
        assert_eq!(FilterMode::from_code(0x1), None);
    }
}
