//! Functions used to create database operations used in the client's `operate()` method.
//!
//! Operations of one command are applied by the server in the order they're given. Operations on
//! collection data types can be scoped to a nested list or map element with
//! [`Operation::with_context`].
//!
//! ```rust
//! use windpike::{
//!     operations::{cdt::CdtContext, lists, scalar},
//!     Bin,
//! };
//!
//! let bin = Bin::new("count", 1);
//! let ops = [
//!     scalar::add(&bin),
//!     lists::append(&lists::ListPolicy::default(), "items", 5)
//!         .with_context(&[CdtContext::MapKey("inner".into())]),
//!     scalar::get(),
//! ];
//! ```

pub mod bitwise;
pub mod cdt;
pub mod exp;
pub mod hll;
pub mod lists;
pub mod maps;
pub mod scalar;

use self::cdt::{CdtContext, CdtOperation};
pub use self::{
    lists::{ListOrderType, ListPolicy, ListReturnType, ListSortFlags, ListWriteFlags},
    maps::{MapOrder, MapPolicy, MapReturnType, MapWriteFlags},
};
use crate::{
    bin,
    commands::ParticleType,
    errors::{Error, Result},
    msgpack::{self, Sink},
    Value,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum OperationType {
    Read = 1,
    Write,
    CdtRead,
    CdtWrite,
    Incr,
    ExpRead = 7,
    ExpWrite,
    Append,
    Prepend,
    Touch,
    BitRead,
    BitWrite,
    Delete,
    HllRead,
    HllWrite,
}

/// Check that a bin value suits the operation type that carries it.
pub(crate) fn check_value(op: OperationType, value: &Value) -> Result<()> {
    match (op, value) {
        (OperationType::Incr, Value::Int(_) | Value::Uint(_) | Value::Float(_))
        | (OperationType::Append | OperationType::Prepend, Value::String(_) | Value::Blob(_))
        | (OperationType::Write, _) => {}
        (op, value) => {
            return Err(Error::invalid_argument(format!(
                "a {} value can't be used for {op:?} operations",
                value.type_name()
            )));
        }
    }
    value.check_bin_value().map_err(Into::into)
}

impl OperationType {
    pub(crate) const fn is_write(self) -> bool {
        !matches!(
            self,
            Self::Read | Self::CdtRead | Self::ExpRead | Self::BitRead | Self::HllRead
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum OperationData {
    None,
    Value(Value),
    Cdt(CdtOperation),
    Exp(exp::ExpOperation),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum OperationBin {
    None,
    All,
    Name(String),
}

/// Database operation definition. This data type is used in the client's `operate()` method.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    pub(crate) op: OperationType,
    pub(crate) ctx: Vec<CdtContext>,
    pub(crate) bin: OperationBin,
    pub(crate) data: OperationData,
}

impl Operation {
    pub(crate) fn new(op: OperationType, bin: OperationBin, data: OperationData) -> Self {
        Self {
            op,
            ctx: Vec::new(),
            bin,
            data,
        }
    }

    /// Scope the operation to a nested list or map element. Only list, map and bitwise operations
    /// make use of the context, it's ignored by all others.
    #[must_use]
    pub fn with_context(mut self, ctx: &[CdtContext]) -> Self {
        self.ctx = ctx.to_vec();
        self
    }

    /// Invert the selection of a list or map operation that takes a return type. For example, a
    /// remove by index range then removes all items outside of the range.
    #[must_use]
    pub fn inverted(mut self) -> Self {
        if let OperationData::Cdt(cdt) = &mut self.data {
            cdt.invert();
        }
        self
    }

    pub(crate) const fn is_write(&self) -> bool {
        self.op.is_write()
    }

    pub(crate) const fn reads_all_bins(&self) -> bool {
        matches!(
            (self.op, &self.bin),
            (OperationType::Read, OperationBin::All)
        )
    }

    pub(crate) const fn reads_header(&self) -> bool {
        matches!(
            (self.op, &self.bin),
            (OperationType::Read, OperationBin::None)
        )
    }

    /// Collection and expression operations may return a result for the same bin several times.
    pub(crate) const fn needs_respond_all(&self) -> bool {
        matches!(self.data, OperationData::Cdt(_) | OperationData::Exp(_))
    }

    /// Check the operation before anything is sent to the server.
    pub(crate) fn validate(&self) -> Result<()> {
        if let OperationBin::Name(name) = &self.bin {
            bin::check_bin_name(name)?;
        }

        match &self.data {
            OperationData::None => Ok(()),
            OperationData::Value(value) => check_value(self.op, value),
            OperationData::Cdt(cdt) => cdt.validate(),
            OperationData::Exp(_) => Ok(()),
        }
    }

    fn particle_type(&self) -> ParticleType {
        match &self.data {
            OperationData::None => ParticleType::Null,
            OperationData::Value(value) => value.particle_type(),
            OperationData::Cdt(_) | OperationData::Exp(_) => ParticleType::Blob,
        }
    }

    fn bin_name(&self) -> &str {
        match &self.bin {
            OperationBin::Name(name) => name,
            OperationBin::None | OperationBin::All => "",
        }
    }

    fn payload(&self, w: &mut impl msgpack::Write) -> usize {
        match &self.data {
            OperationData::None => 0,
            OperationData::Value(value) => value.write_to(w),
            OperationData::Cdt(cdt) => cdt.write_to(w, &self.ctx),
            OperationData::Exp(exp) => exp.write_to(w),
        }
    }

    /// Size of the operation on the wire, including its 8 byte header.
    pub(crate) fn estimate_size(&self) -> usize {
        8 + self.bin_name().len() + self.payload(&mut Sink)
    }

    pub(crate) fn write_to(&self, w: &mut impl msgpack::Write) -> usize {
        let name = self.bin_name();
        let size = self.estimate_size() - 4;

        let mut written = w.write_u32(size as u32);
        written += w.write_u8(self.op as u8);
        written += w.write_u8(self.particle_type() as u8);
        written += w.write_u8(0);
        written += w.write_u8(name.len() as u8);
        written += w.write_str(name);
        written + self.payload(w)
    }
}
