//! ASIC object id types.
//!
//! Orchestrator tables store the raw 64-bit id the driver hands back; the
//! typed wrappers exist for interfaces where mixing object families would be
//! an easy mistake.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Raw ASIC object id.
pub type RawObjectId = u64;

/// The null object id. A table entry carrying this id is not programmed.
pub const NULL_OBJECT_ID: RawObjectId = 0;

/// Marker trait for ASIC object families.
pub trait ObjectKind: Send + Sync + 'static {
    fn type_name() -> &'static str;
}

/// A typed ASIC object id.
#[derive(Clone, Copy)]
pub struct ObjectId<T: ObjectKind> {
    raw: RawObjectId,
    _marker: PhantomData<T>,
}

impl<T: ObjectKind> ObjectId<T> {
    pub const NULL: Self = Self {
        raw: NULL_OBJECT_ID,
        _marker: PhantomData,
    };

    pub const fn from_raw(raw: RawObjectId) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub const fn as_raw(&self) -> RawObjectId {
        self.raw
    }

    pub const fn is_null(&self) -> bool {
        self.raw == NULL_OBJECT_ID
    }
}

impl<T: ObjectKind> fmt::Debug for ObjectId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:x})", T::type_name(), self.raw)
    }
}

impl<T: ObjectKind> PartialEq for ObjectId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: ObjectKind> Eq for ObjectId<T> {}

impl<T: ObjectKind> Hash for ObjectId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T: ObjectKind> Default for ObjectId<T> {
    fn default() -> Self {
        Self::NULL
    }
}

macro_rules! define_object_kind {
    ($name:ident, $type_name:literal, $alias:ident) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl ObjectKind for $name {
            fn type_name() -> &'static str {
                $type_name
            }
        }

        pub type $alias = ObjectId<$name>;
    };
}

define_object_kind!(NextHopKind, "NextHop", NextHopOid);
define_object_kind!(NextHopGroupKind, "NextHopGroup", NextHopGroupOid);
define_object_kind!(NextHopGroupMemberKind, "NextHopGroupMember", NextHopGroupMemberOid);
define_object_kind!(TunnelKind, "Tunnel", TunnelOid);
define_object_kind!(TunnelMapKind, "TunnelMap", TunnelMapOid);
define_object_kind!(TunnelMapEntryKind, "TunnelMapEntry", TunnelMapEntryOid);
define_object_kind!(Srv6SidListKind, "Srv6SidList", Srv6SidListOid);
define_object_kind!(VirtualRouterKind, "VirtualRouter", VirtualRouterOid);
define_object_kind!(RouterInterfaceKind, "RouterInterface", RouterInterfaceOid);
