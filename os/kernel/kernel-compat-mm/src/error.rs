//! Error taxonomy of the compatibility layer.

use crate::cache::CacheAttribute;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// `ENOMEM`: out of memory.
pub const ENOMEM: i32 = 12;
/// `EFAULT`: bad address.
pub const EFAULT: i32 = 14;
/// `EINVAL`: invalid argument.
pub const EINVAL: i32 = 22;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Physical pages or mapping resources are exhausted. Retryable.
    #[error("out of physical pages or mapping resources")]
    ResourceExhausted,
    #[error("offset {offset:#x} is outside of the {size:#x} byte region")]
    InvalidArgument { offset: u64, size: u64 },
    #[error("page at {0} has no permanent kernel address")]
    NoKernelAddress(PhysicalAddress),
    /// A user address could not be resolved.
    #[error("bad address {address}")]
    Fault { address: VirtualAddress },
    #[error("caching attribute {0:?} cannot be applied")]
    UnsupportedAttribute(CacheAttribute),
}

/// How a driver fault handler should complete after an error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VmFault {
    /// Nothing was installed; return and let the access retry.
    NoPage,
    /// The access cannot be satisfied.
    SigBus,
}

impl Error {
    /// The negative errno a Linux-style caller expects.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::ResourceExhausted => -ENOMEM,
            Self::Fault { .. } => -EFAULT,
            Self::InvalidArgument { .. }
            | Self::NoKernelAddress(_)
            | Self::UnsupportedAttribute(_) => -EINVAL,
        }
    }

    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. } | Self::NoKernelAddress(_))
    }

    /// Exhaustion is the "try again" sentinel for the fault path.
    #[must_use]
    pub const fn fault_disposition(&self) -> VmFault {
        match self {
            Self::ResourceExhausted => VmFault::NoPage,
            _ => VmFault::SigBus,
        }
    }
}

/// A user-space access that the host could not resolve.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unresolvable user access at {address}")]
pub struct UserFault {
    pub address: VirtualAddress,
}

impl From<UserFault> for Error {
    fn from(value: UserFault) -> Self {
        Self::Fault {
            address: value.address,
        }
    }
}

/// The host's page tables cannot express a caching attribute.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("page tables cannot represent {attribute:?}")]
pub struct AttributeError {
    pub attribute: CacheAttribute,
}

impl From<AttributeError> for Error {
    fn from(value: AttributeError) -> Self {
        Self::UnsupportedAttribute(value.attribute)
    }
}
