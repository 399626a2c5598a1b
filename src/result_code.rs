use std::{borrow::Cow, fmt};

macro_rules! result_codes {
    ($($(#[$meta:meta])* $name:ident = $code:literal => $msg:literal,)*) => {
        /// Database operation result codes, as reported in the message header of every server
        /// response.
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        pub enum ResultCode {
            $($(#[$meta])* $name,)*
            /// Result code the client doesn't know about.
            Unknown(u8),
        }

        impl ResultCode {
            /// Convert the raw code from a server response.
            #[must_use]
            pub const fn from_u8(n: u8) -> Self {
                match n {
                    $($code => Self::$name,)*
                    code => Self::Unknown(code),
                }
            }

            /// Raw code as sent on the wire.
            #[must_use]
            pub const fn to_u8(self) -> u8 {
                match self {
                    $(Self::$name => $code,)*
                    Self::Unknown(code) => code,
                }
            }

            /// Human readable description of the result code.
            #[must_use]
            pub fn into_string(self) -> Cow<'static, str> {
                match self {
                    $(Self::$name => $msg.into(),)*
                    Self::Unknown(code) => format!("Unknown server error code: {code}").into(),
                }
            }
        }
    };
}

result_codes! {
    /// Operation was successful.
    Ok = 0 => "ok",
    /// Unknown server failure.
    ServerError = 1 => "Server error",
    /// Record doesn't exist. Not a failure for reads, deletes and existence checks.
    KeyNotFoundError = 2 => "Key not found",
    /// Modifying a record with unexpected generation.
    GenerationError = 3 => "Generation error",
    /// Bad parameter(s) were passed in database operation call.
    ParameterError = 4 => "Parameter error",
    /// Create-only operation on a record that already exists.
    KeyExistsError = 5 => "Key already exists",
    /// Bin already exists on a create-only operation.
    BinExistsError = 6 => "Bin already exists",
    /// Expected cluster ID was not received.
    ClusterKeyMismatch = 7 => "Cluster key mismatch",
    /// Server has run out of memory.
    ServerMemError = 8 => "Server memory error",
    /// Client or server has timed out.
    Timeout = 9 => "Timeout",
    /// Operation not allowed in current configuration.
    AlwaysForbidden = 10 => "Operation not allowed",
    /// Partition is unavailable.
    PartitionUnavailable = 11 => "Partitions unavailable",
    /// Operation is not supported with the stored bin type.
    BinTypeError = 12 => "Bin type error",
    /// Record size exceeds limit.
    RecordTooBig = 13 => "Record too big",
    /// Too many concurrent operations on the same record.
    KeyBusy = 14 => "Hot key",
    /// Scan aborted by server.
    ScanAbort = 15 => "Scan aborted",
    /// Unsupported server feature.
    UnsupportedFeature = 16 => "Unsupported Server Feature",
    /// Bin not found on update-only operation.
    BinNotFound = 17 => "Bin not found",
    /// Device not keeping up with writes.
    DeviceOverload = 18 => "Device overload",
    /// Key type mismatch.
    KeyMismatch = 19 => "Key mismatch",
    /// Invalid namespace.
    InvalidNamespace = 20 => "Namespace not found",
    /// Bin name too long or maximum bins exceeded.
    BinNameTooLong = 21 => "Bin name length greater than 15 characters or maximum bins exceeded",
    /// Operation not allowed at this time.
    FailForbidden = 22 => "Operation not allowed at this time",
    /// Element not found in CDT.
    ElementNotFound = 23 => "Element not found",
    /// Element already exists in CDT.
    ElementExists = 24 => "Element exists",
    /// Enterprise feature used on a community server.
    EnterpriseOnly = 25 => "Enterprise only",
    /// The operation cannot be applied to the current bin value on the server.
    OpNotApplicable = 26 => "Operation not applicable",
    /// The filter expression evaluated to false. Not a failure.
    FilteredOut = 27 => "Transaction filtered out",
    /// Write command loses conflict to XDR.
    LostConflict = 28 => "Transaction failed due to conflict with XDR",
    /// There are no more records left for query.
    QueryEnd = 50 => "Query end",
    /// Security functionality not supported by connected server.
    SecurityNotSupported = 51 => "Security not supported",
    /// Security functionality not enabled by connected server.
    SecurityNotEnabled = 52 => "Security not enabled",
    /// Security configuration not supported.
    SecuritySchemeNotSupported = 53 => "Security scheme not supported",
    /// Administration command is invalid.
    InvalidCommand = 54 => "Invalid command",
    /// Administration field is invalid.
    InvalidField = 55 => "Invalid field",
    /// Security protocol not followed.
    IllegalState = 56 => "Illegal state",
    /// User name is invalid.
    InvalidUser = 60 => "Invalid user",
    /// User was previously created.
    UserAlreadyExists = 61 => "User already exists",
    /// Password is invalid.
    InvalidPassword = 62 => "Invalid password",
    /// Password has expired.
    ExpiredPassword = 63 => "Expired password",
    /// Forbidden password (e.g. recently used).
    ForbiddenPassword = 64 => "Forbidden password",
    /// Security credential is invalid.
    InvalidCredential = 65 => "Invalid credential",
    /// Login session expired.
    InvalidSession = 66 => "Login session expired",
    /// Role name is invalid.
    InvalidRole = 70 => "Invalid role",
    /// Role already exists.
    RoleAlreadyExists = 71 => "Role already exists",
    /// Privilege is invalid.
    InvalidPrivilege = 72 => "Invalid privilege",
    /// Invalid IP address whitelist.
    InvalidWhitelist = 73 => "Invalid whitelist",
    /// Quotas not enabled on server.
    QuotasNotEnabled = 74 => "Quotas not enabled",
    /// Invalid quota value.
    InvalidQuota = 75 => "Invalid quota",
    /// User must authenticate before performing database operations.
    NotAuthenticated = 80 => "Not authenticated",
    /// User does not possess the required role.
    RoleViolation = 81 => "Role violation",
    /// Sender IP address not whitelisted.
    NotWhitelisted = 82 => "Command not whitelisted",
    /// Quota exceeded.
    QuotaExceeded = 83 => "Quota exceeded",
    /// A user defined function returned an error code.
    UdfBadResponse = 100 => "UDF returned error",
    /// Batch functionality has been disabled.
    BatchDisabled = 150 => "Batch functionality has been disabled",
    /// Batch max requests have been exceeded.
    BatchMaxRequestsExceeded = 151 => "Batch max requests have been exceeded",
    /// All batch queues are full.
    BatchQueuesFull = 152 => "All batch queues are full",
    /// Secondary index already exists.
    IndexAlreadyExists = 200 => "Index already exists",
    /// Requested secondary index does not exist.
    IndexNotFound = 201 => "Index not found",
    /// Secondary index memory space exceeded.
    IndexOom = 202 => "Index out of memory",
    /// Secondary index not available.
    IndexNotReadable = 203 => "Index not readable",
    /// Generic secondary index error.
    IndexGeneric = 204 => "Index error",
    /// Index name maximum length exceeded.
    IndexNameMaxLen = 205 => "Index name max length exceeded",
    /// Maximum number of indices exceeded.
    IndexMaxCount = 206 => "Index count exceeds max",
    /// Secondary index query aborted.
    QueryAborted = 210 => "Query aborted",
    /// Secondary index queue full.
    QueryQueueFull = 211 => "Query queue full",
    /// Secondary index query timed out on server.
    QueryTimeout = 212 => "Query timeout",
    /// Generic query error.
    QueryGeneric = 213 => "Query error",
}

impl ResultCode {
    /// Whether the code reports a completed operation. Besides [`Self::Ok`] this includes the
    /// two "no result" outcomes: a missing record and a record rejected by a filter expression.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::KeyNotFoundError | Self::FilteredOut)
    }

    /// Whether a command failing with this code may succeed when sent again.
    #[must_use]
    pub const fn is_retriable(self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::KeyBusy
                | Self::DeviceOverload
                | Self::PartitionUnavailable
                | Self::ClusterKeyMismatch
        )
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.into_string())
    }
}

impl From<u8> for ResultCode {
    fn from(value: u8) -> Self {
        Self::from_u8(value)
    }
}

impl From<ResultCode> for u8 {
    fn from(value: ResultCode) -> Self {
        value.to_u8()
    }
}

#[cfg(test)]
mod tests {
    use super::ResultCode;

    #[test]
    fn from_result_code() {
        assert_eq!(ResultCode::KeyNotFoundError, ResultCode::from(2u8));
        assert_eq!(ResultCode::FilteredOut, ResultCode::from(27u8));
        assert_eq!(ResultCode::QueryGeneric, ResultCode::from(213u8));
    }

    #[test]
    fn from_unknown_result_code() {
        assert_eq!(ResultCode::Unknown(234), ResultCode::from(234u8));
        assert_eq!(234, u8::from(ResultCode::Unknown(234)));
    }

    #[test]
    fn codes_survive_the_wire() {
        for code in 0..=u8::MAX {
            assert_eq!(code, ResultCode::from_u8(code).to_u8());
        }
    }

    #[test]
    fn into_string() {
        assert_eq!("Key not found", ResultCode::KeyNotFoundError.into_string());
        assert_eq!(
            "Unknown server error code: 234",
            ResultCode::Unknown(234).into_string()
        );
    }

    #[test]
    fn not_found_and_filtered_are_not_failures() {
        assert!(ResultCode::KeyNotFoundError.is_success());
        assert!(ResultCode::FilteredOut.is_success());
        assert!(!ResultCode::BinTypeError.is_success());
        assert!(!ResultCode::FilteredOut.is_retriable());
        assert!(ResultCode::KeyBusy.is_retriable());
    }
}
