//! Users, roles and privileges of the server's access control.

use std::fmt;

/// User and assigned roles.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct User {
    /// User name.
    pub user: String,
    /// List of assigned roles.
    pub roles: Vec<String>,
    /// Read statistics, like the current read transactions per second. Only reported when quotas
    /// are enabled on the server.
    pub read_info: Vec<u32>,
    /// Write statistics, in the same layout as [`Self::read_info`].
    pub write_info: Vec<u32>,
    /// Number of currently open connections of the user.
    pub conns_in_use: u32,
}

/// A user defined role with its privileges and limits.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Role {
    pub name: String,
    pub privileges: Vec<Privilege>,
    /// IP addresses the role's users may connect from. Empty means no restriction.
    pub allowlist: Vec<String>,
    /// Maximum reads per second, or zero for no limit.
    pub read_quota: u32,
    /// Maximum writes per second, or zero for no limit.
    pub write_quota: u32,
}

/// Permission to use a part of the server, optionally scoped to a namespace and set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Privilege {
    pub code: PrivilegeCode,
    pub namespace: Option<String>,
    pub set_name: Option<String>,
}

impl Privilege {
    /// Create a privilege that applies to the whole cluster.
    #[must_use]
    pub const fn global(code: PrivilegeCode) -> Self {
        Self {
            code,
            namespace: None,
            set_name: None,
        }
    }

    /// Create a privilege that is limited to a namespace and, optionally, one set in it. Only
    /// the data privileges ([`PrivilegeCode::can_scope`]) accept a scope.
    #[must_use]
    pub fn scoped(code: PrivilegeCode, namespace: &str, set_name: Option<&str>) -> Self {
        Self {
            code,
            namespace: Some(namespace.to_owned()),
            set_name: set_name.map(ToOwned::to_owned),
        }
    }
}

/// Kind of access a [`Privilege`] grants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PrivilegeCode {
    /// Manage users and their roles.
    UserAdmin,
    /// Manage indexes, user defined functions and server configuration.
    SysAdmin,
    /// Manage indexes and user defined functions.
    DataAdmin,
    /// Manage user defined functions.
    UdfAdmin,
    /// Manage secondary indexes.
    SIndexAdmin,
    Read,
    ReadWrite,
    ReadWriteUdf,
    Write,
    /// Issue truncate commands.
    Truncate,
}

impl PrivilegeCode {
    /// Whether the privilege can be limited to a namespace and set.
    #[must_use]
    pub const fn can_scope(self) -> bool {
        matches!(
            self,
            Self::Read | Self::ReadWrite | Self::ReadWriteUdf | Self::Write | Self::Truncate
        )
    }

    pub(crate) const fn to_u8(self) -> u8 {
        match self {
            Self::UserAdmin => 0,
            Self::SysAdmin => 1,
            Self::DataAdmin => 2,
            Self::UdfAdmin => 3,
            Self::SIndexAdmin => 4,
            Self::Read => 10,
            Self::ReadWrite => 11,
            Self::ReadWriteUdf => 12,
            Self::Write => 13,
            Self::Truncate => 14,
        }
    }

    pub(crate) const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::UserAdmin,
            1 => Self::SysAdmin,
            2 => Self::DataAdmin,
            3 => Self::UdfAdmin,
            4 => Self::SIndexAdmin,
            10 => Self::Read,
            11 => Self::ReadWrite,
            12 => Self::ReadWriteUdf,
            13 => Self::Write,
            14 => Self::Truncate,
            _ => return None,
        })
    }
}

impl fmt::Display for PrivilegeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UserAdmin => "user-admin",
            Self::SysAdmin => "sys-admin",
            Self::DataAdmin => "data-admin",
            Self::UdfAdmin => "udf-admin",
            Self::SIndexAdmin => "sindex-admin",
            Self::Read => "read",
            Self::ReadWrite => "read-write",
            Self::ReadWriteUdf => "read-write-udf",
            Self::Write => "write",
            Self::Truncate => "truncate",
        })
    }
}
