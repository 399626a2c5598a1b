//! Filter expressions, evaluated by the server against a record's metadata and bins.
//!
//! Expressions are attached to a policy through
//! [`BasePolicy::filter_expression`](crate::policies::BasePolicy::filter_expression). When the
//! expression evaluates to false, the command is not applied to the record and the server reports
//! [`ResultCode::FilteredOut`](crate::ResultCode::FilteredOut). Expressions can also compute
//! values inside [`Client::operate`](crate::Client::operate), see
//! [`operations::exp`](crate::operations::exp).
//!
//! ```rust
//! use windpike::exp;
//!
//! // Records where bin "a" is larger than 10 and bin "b" exists.
//! let filter = exp::and(vec![
//!     exp::gt(exp::int_bin("a"), exp::int_val(10)),
//!     exp::bin_exists("b"),
//! ]);
//! ```

#![allow(clippy::needless_pass_by_value)]

use std::collections::HashMap;

use bitflags::bitflags;

use crate::{
    msgpack::{encoder, Sink, Write},
    MapKey, Value,
};

/// Value type of an expression, used to tell the server how to read bins and keys.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExpType {
    Nil = 0,
    Bool = 1,
    Int = 2,
    String = 3,
    List = 4,
    Map = 5,
    Blob = 6,
    Float = 7,
    Geo = 8,
    Hll = 9,
}

bitflags! {
    /// Flags of [`regex_compare`], matching the POSIX `regcomp` flags.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct RegexFlags: i64 {
        /// Use POSIX extended regular expression syntax.
        const EXTENDED = 1;
        /// Ignore case.
        const ICASE = 1 << 1;
        /// Don't report position of matches.
        const NOSUB = 1 << 2;
        /// Match-any-character operators don't match a newline.
        const NEWLINE = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ExpOp {
    Unknown = 0,
    Eq = 1,
    Ne = 2,
    Gt = 3,
    Ge = 4,
    Lt = 5,
    Le = 6,
    Regex = 7,
    Geo = 8,
    And = 16,
    Or = 17,
    Not = 18,
    Xor = 19,
    Add = 20,
    Sub = 21,
    Mul = 22,
    Div = 23,
    Pow = 24,
    Log = 25,
    Mod = 26,
    Abs = 27,
    Floor = 28,
    Ceil = 29,
    ToInt = 30,
    ToFloat = 31,
    IntAnd = 32,
    IntOr = 33,
    IntXor = 34,
    IntNot = 35,
    IntLshift = 36,
    IntRshift = 37,
    IntArshift = 38,
    IntCount = 39,
    IntLscan = 40,
    IntRscan = 41,
    Min = 50,
    Max = 51,
    DigestModulo = 64,
    DeviceSize = 65,
    LastUpdate = 66,
    SinceUpdate = 67,
    VoidTime = 68,
    Ttl = 69,
    SetName = 70,
    KeyExists = 71,
    IsTombstone = 72,
    Key = 80,
    Bin = 81,
    BinType = 82,
    Cond = 123,
    Var = 124,
    Let = 125,
    Quoted = 126,
}

#[derive(Clone, Debug, PartialEq)]
enum Node {
    /// Operator applied to its arguments: `[op, args...]`.
    Call(ExpOp, Vec<Expression>),
    /// Record metadata without arguments: `[op]`.
    Meta(ExpOp),
    Key(ExpType),
    Bin(ExpType, String),
    BinType(String),
    DigestModulo(i64),
    Regex {
        regex: String,
        flags: RegexFlags,
        bin: Box<Expression>,
    },
    Let(Vec<LetDef>, Box<Expression>),
    Var(String),
    Literal(Value),
    Geo(String),
}

/// Expression tree. Build it with the functions of this module.
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    node: Node,
}

/// Variable definition of [`exp_let`].
#[derive(Clone, Debug, PartialEq)]
pub struct LetDef {
    name: String,
    value: Expression,
}

impl Expression {
    const fn new(node: Node) -> Self {
        Self { node }
    }

    fn call(op: ExpOp, args: Vec<Self>) -> Self {
        Self::new(Node::Call(op, args))
    }

    /// Serialize the expression into its MessagePack form.
    pub(crate) fn pack(&self, w: &mut impl Write) -> usize {
        match &self.node {
            Node::Call(op, args) => {
                let mut size = encoder::pack_array_begin(w, args.len() + 1);
                size += encoder::pack_integer(w, *op as i64);
                for arg in args {
                    size += arg.pack(w);
                }
                size
            }
            Node::Meta(op) => {
                encoder::pack_array_begin(w, 1) + encoder::pack_integer(w, *op as i64)
            }
            Node::Key(ty) => {
                encoder::pack_array_begin(w, 2)
                    + encoder::pack_integer(w, ExpOp::Key as i64)
                    + encoder::pack_integer(w, *ty as i64)
            }
            Node::Bin(ty, name) => {
                encoder::pack_array_begin(w, 3)
                    + encoder::pack_integer(w, ExpOp::Bin as i64)
                    + encoder::pack_integer(w, *ty as i64)
                    + encoder::pack_raw_string(w, name)
            }
            Node::BinType(name) => {
                encoder::pack_array_begin(w, 2)
                    + encoder::pack_integer(w, ExpOp::BinType as i64)
                    + encoder::pack_raw_string(w, name)
            }
            Node::DigestModulo(modulo) => {
                encoder::pack_array_begin(w, 2)
                    + encoder::pack_integer(w, ExpOp::DigestModulo as i64)
                    + encoder::pack_integer(w, *modulo)
            }
            Node::Regex { regex, flags, bin } => {
                encoder::pack_array_begin(w, 4)
                    + encoder::pack_integer(w, ExpOp::Regex as i64)
                    + encoder::pack_integer(w, flags.bits())
                    + encoder::pack_raw_string(w, regex)
                    + bin.pack(w)
            }
            Node::Let(defs, scope) => {
                let mut size = encoder::pack_array_begin(w, defs.len() * 2 + 2);
                size += encoder::pack_integer(w, ExpOp::Let as i64);
                for def in defs {
                    size += encoder::pack_raw_string(w, &def.name);
                    size += def.value.pack(w);
                }
                size + scope.pack(w)
            }
            Node::Var(name) => {
                encoder::pack_array_begin(w, 2)
                    + encoder::pack_integer(w, ExpOp::Var as i64)
                    + encoder::pack_raw_string(w, name)
            }
            Node::Literal(value) => pack_literal(w, value),
            Node::Geo(geo) => encoder::pack_geo_json(w, geo),
        }
    }

    /// Size of the packed expression in bytes.
    pub(crate) fn packed_size(&self) -> usize {
        self.pack(&mut Sink)
    }
}

/// Lists need quoting, as the server would otherwise read them as an expression call.
fn pack_literal(w: &mut impl Write, value: &Value) -> usize {
    match value {
        Value::List(list) => {
            encoder::pack_array_begin(w, 2)
                + encoder::pack_integer(w, ExpOp::Quoted as i64)
                + encoder::pack_array(w, list)
        }
        other => encoder::pack_value(w, other),
    }
}

/// Record key of the given type. Only available if the key was stored with the record, which
/// requires [`BasePolicy::send_key`](crate::policies::BasePolicy::send_key) on write.
#[must_use]
pub fn key(ty: ExpType) -> Expression {
    Expression::new(Node::Key(ty))
}

/// Whether the user key is stored with the record.
#[must_use]
pub fn key_exists() -> Expression {
    Expression::new(Node::Meta(ExpOp::KeyExists))
}

/// Bin value of the given type.
#[must_use]
pub fn bin(name: impl Into<String>, ty: ExpType) -> Expression {
    Expression::new(Node::Bin(ty, name.into()))
}

#[must_use]
pub fn int_bin(name: impl Into<String>) -> Expression {
    bin(name, ExpType::Int)
}

#[must_use]
pub fn string_bin(name: impl Into<String>) -> Expression {
    bin(name, ExpType::String)
}

#[must_use]
pub fn blob_bin(name: impl Into<String>) -> Expression {
    bin(name, ExpType::Blob)
}

#[must_use]
pub fn float_bin(name: impl Into<String>) -> Expression {
    bin(name, ExpType::Float)
}

#[must_use]
pub fn geo_bin(name: impl Into<String>) -> Expression {
    bin(name, ExpType::Geo)
}

#[must_use]
pub fn list_bin(name: impl Into<String>) -> Expression {
    bin(name, ExpType::List)
}

#[must_use]
pub fn map_bin(name: impl Into<String>) -> Expression {
    bin(name, ExpType::Map)
}

#[must_use]
pub fn hll_bin(name: impl Into<String>) -> Expression {
    bin(name, ExpType::Hll)
}

/// Whether the bin exists in the record.
#[must_use]
pub fn bin_exists(name: impl Into<String>) -> Expression {
    ne(bin_type(name), int_val(0))
}

/// Particle type of the bin, `0` if it doesn't exist.
#[must_use]
pub fn bin_type(name: impl Into<String>) -> Expression {
    Expression::new(Node::BinType(name.into()))
}

#[must_use]
pub fn set_name() -> Expression {
    Expression::new(Node::Meta(ExpOp::SetName))
}

/// Record size on disk in bytes.
#[must_use]
pub fn device_size() -> Expression {
    Expression::new(Node::Meta(ExpOp::DeviceSize))
}

/// Last update time in nanoseconds since the Unix epoch.
#[must_use]
pub fn last_update() -> Expression {
    Expression::new(Node::Meta(ExpOp::LastUpdate))
}

/// Milliseconds since the last update.
#[must_use]
pub fn since_update() -> Expression {
    Expression::new(Node::Meta(ExpOp::SinceUpdate))
}

/// Expiration time in nanoseconds since the Unix epoch.
#[must_use]
pub fn void_time() -> Expression {
    Expression::new(Node::Meta(ExpOp::VoidTime))
}

/// Remaining time to live in seconds.
#[must_use]
pub fn ttl() -> Expression {
    Expression::new(Node::Meta(ExpOp::Ttl))
}

#[must_use]
pub fn is_tombstone() -> Expression {
    Expression::new(Node::Meta(ExpOp::IsTombstone))
}

/// Record digest modulo `modulo`, handy to sample a fraction of the records.
#[must_use]
pub fn digest_modulo(modulo: i64) -> Expression {
    Expression::new(Node::DigestModulo(modulo))
}

/// Match a string bin against a POSIX regular expression.
#[must_use]
pub fn regex_compare(regex: impl Into<String>, flags: RegexFlags, bin: Expression) -> Expression {
    Expression::new(Node::Regex {
        regex: regex.into(),
        flags,
        bin: Box::new(bin),
    })
}

/// Whether the two GeoJSON values intersect or one contains the other.
#[must_use]
pub fn geo_compare(left: Expression, right: Expression) -> Expression {
    Expression::call(ExpOp::Geo, vec![left, right])
}

#[must_use]
pub fn int_val(value: i64) -> Expression {
    Expression::new(Node::Literal(Value::Int(value)))
}

#[must_use]
pub fn bool_val(value: bool) -> Expression {
    Expression::new(Node::Literal(Value::Bool(value)))
}

#[must_use]
pub fn string_val(value: impl Into<String>) -> Expression {
    Expression::new(Node::Literal(Value::String(value.into())))
}

#[must_use]
pub fn float_val(value: f64) -> Expression {
    Expression::new(Node::Literal(Value::from(value)))
}

#[must_use]
pub fn blob_val(value: Vec<u8>) -> Expression {
    Expression::new(Node::Literal(Value::Blob(value)))
}

#[must_use]
pub fn geo_val(value: impl Into<String>) -> Expression {
    Expression::new(Node::Geo(value.into()))
}

#[must_use]
pub fn list_val(value: Vec<Value>) -> Expression {
    Expression::new(Node::Literal(Value::List(value)))
}

#[must_use]
pub fn map_val(value: HashMap<MapKey, Value>) -> Expression {
    Expression::new(Node::Literal(Value::HashMap(value)))
}

#[must_use]
pub fn nil() -> Expression {
    Expression::new(Node::Literal(Value::Nil))
}

#[must_use]
pub fn not(exp: Expression) -> Expression {
    Expression::call(ExpOp::Not, vec![exp])
}

#[must_use]
pub fn and(exps: Vec<Expression>) -> Expression {
    Expression::call(ExpOp::And, exps)
}

#[must_use]
pub fn or(exps: Vec<Expression>) -> Expression {
    Expression::call(ExpOp::Or, exps)
}

/// True if exactly one of the expressions is true.
#[must_use]
pub fn xor(exps: Vec<Expression>) -> Expression {
    Expression::call(ExpOp::Xor, exps)
}

#[must_use]
pub fn eq(left: Expression, right: Expression) -> Expression {
    Expression::call(ExpOp::Eq, vec![left, right])
}

#[must_use]
pub fn ne(left: Expression, right: Expression) -> Expression {
    Expression::call(ExpOp::Ne, vec![left, right])
}

#[must_use]
pub fn gt(left: Expression, right: Expression) -> Expression {
    Expression::call(ExpOp::Gt, vec![left, right])
}

#[must_use]
pub fn ge(left: Expression, right: Expression) -> Expression {
    Expression::call(ExpOp::Ge, vec![left, right])
}

#[must_use]
pub fn lt(left: Expression, right: Expression) -> Expression {
    Expression::call(ExpOp::Lt, vec![left, right])
}

#[must_use]
pub fn le(left: Expression, right: Expression) -> Expression {
    Expression::call(ExpOp::Le, vec![left, right])
}

#[must_use]
pub fn num_add(exps: Vec<Expression>) -> Expression {
    Expression::call(ExpOp::Add, exps)
}

#[must_use]
pub fn num_sub(exps: Vec<Expression>) -> Expression {
    Expression::call(ExpOp::Sub, exps)
}

#[must_use]
pub fn num_mul(exps: Vec<Expression>) -> Expression {
    Expression::call(ExpOp::Mul, exps)
}

#[must_use]
pub fn num_div(exps: Vec<Expression>) -> Expression {
    Expression::call(ExpOp::Div, exps)
}

#[must_use]
pub fn num_pow(base: Expression, exponent: Expression) -> Expression {
    Expression::call(ExpOp::Pow, vec![base, exponent])
}

#[must_use]
pub fn num_log(num: Expression, base: Expression) -> Expression {
    Expression::call(ExpOp::Log, vec![num, base])
}

#[must_use]
pub fn num_mod(numerator: Expression, denominator: Expression) -> Expression {
    Expression::call(ExpOp::Mod, vec![numerator, denominator])
}

#[must_use]
pub fn num_abs(value: Expression) -> Expression {
    Expression::call(ExpOp::Abs, vec![value])
}

#[must_use]
pub fn num_floor(num: Expression) -> Expression {
    Expression::call(ExpOp::Floor, vec![num])
}

#[must_use]
pub fn num_ceil(num: Expression) -> Expression {
    Expression::call(ExpOp::Ceil, vec![num])
}

#[must_use]
pub fn to_int(num: Expression) -> Expression {
    Expression::call(ExpOp::ToInt, vec![num])
}

#[must_use]
pub fn to_float(num: Expression) -> Expression {
    Expression::call(ExpOp::ToFloat, vec![num])
}

#[must_use]
pub fn int_and(exps: Vec<Expression>) -> Expression {
    Expression::call(ExpOp::IntAnd, exps)
}

#[must_use]
pub fn int_or(exps: Vec<Expression>) -> Expression {
    Expression::call(ExpOp::IntOr, exps)
}

#[must_use]
pub fn int_xor(exps: Vec<Expression>) -> Expression {
    Expression::call(ExpOp::IntXor, exps)
}

#[must_use]
pub fn int_not(exp: Expression) -> Expression {
    Expression::call(ExpOp::IntNot, vec![exp])
}

#[must_use]
pub fn int_lshift(value: Expression, shift: Expression) -> Expression {
    Expression::call(ExpOp::IntLshift, vec![value, shift])
}

#[must_use]
pub fn int_rshift(value: Expression, shift: Expression) -> Expression {
    Expression::call(ExpOp::IntRshift, vec![value, shift])
}

/// Arithmetic right shift, keeping the sign.
#[must_use]
pub fn int_arshift(value: Expression, shift: Expression) -> Expression {
    Expression::call(ExpOp::IntArshift, vec![value, shift])
}

/// Number of set bits.
#[must_use]
pub fn int_count(exp: Expression) -> Expression {
    Expression::call(ExpOp::IntCount, vec![exp])
}

/// Position of the first bit equal to `search`, scanning from the most significant bit.
#[must_use]
pub fn int_lscan(value: Expression, search: Expression) -> Expression {
    Expression::call(ExpOp::IntLscan, vec![value, search])
}

/// Position of the last bit equal to `search`, scanning from the most significant bit.
#[must_use]
pub fn int_rscan(value: Expression, search: Expression) -> Expression {
    Expression::call(ExpOp::IntRscan, vec![value, search])
}

#[must_use]
pub fn min(exps: Vec<Expression>) -> Expression {
    Expression::call(ExpOp::Min, exps)
}

#[must_use]
pub fn max(exps: Vec<Expression>) -> Expression {
    Expression::call(ExpOp::Max, exps)
}

/// Conditional: `cond(vec![bool1, action1, bool2, action2, ..., default])`.
#[must_use]
pub fn cond(exps: Vec<Expression>) -> Expression {
    Expression::call(ExpOp::Cond, exps)
}

/// Define variables and evaluate `scope` with them in reach of [`var`].
///
/// ```rust
/// use windpike::exp;
///
/// // 5 < a < 10
/// let filter = exp::exp_let(
///     vec![exp::def("x", exp::int_bin("a"))],
///     exp::and(vec![
///         exp::lt(exp::int_val(5), exp::var("x")),
///         exp::lt(exp::var("x"), exp::int_val(10)),
///     ]),
/// );
/// ```
#[must_use]
pub fn exp_let(defs: Vec<LetDef>, scope: Expression) -> Expression {
    Expression::new(Node::Let(defs, Box::new(scope)))
}

/// Variable definition for [`exp_let`].
#[must_use]
pub fn def(name: impl Into<String>, value: Expression) -> LetDef {
    LetDef {
        name: name.into(),
        value,
    }
}

/// Reference to a variable defined by [`exp_let`].
#[must_use]
pub fn var(name: impl Into<String>) -> Expression {
    Expression::new(Node::Var(name.into()))
}

/// Fail evaluation, for example in the default branch of [`cond`].
#[must_use]
pub fn unknown() -> Expression {
    Expression::new(Node::Meta(ExpOp::Unknown))
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    fn packed(exp: &Expression) -> Vec<u8> {
        let mut buf = BytesMut::new();
        let size = exp.pack(&mut buf);
        assert_eq!(size, buf.len());
        assert_eq!(size, exp.packed_size());
        buf.to_vec()
    }

    #[test]
    fn compare_int_bin() {
        assert_eq!(
            vec![0x93, 0x03, 0x93, 0x51, 0x02, 0xa1, b'a', 0x0a],
            packed(&gt(int_bin("a"), int_val(10)))
        );
    }

    #[test]
    fn bin_exists_checks_type() {
        assert_eq!(
            vec![0x93, 0x02, 0x92, 0x52, 0xa1, b'b', 0x00],
            packed(&bin_exists("b"))
        );
    }

    #[test]
    fn string_literal_has_particle_type() {
        assert_eq!(
            vec![0x93, 0x01, 0x91, 0x46, 0xa2, 0x03, b'x'],
            packed(&eq(set_name(), string_val("x")))
        );
    }

    #[test]
    fn list_literal_is_quoted() {
        assert_eq!(
            vec![0x92, 0x7e, 0x92, 0x01, 0x02],
            packed(&list_val(vec![Value::Int(1), Value::Int(2)]))
        );
    }

    #[test]
    fn let_bindings() {
        let exp = exp_let(vec![def("x", int_val(1))], var("x"));
        assert_eq!(
            vec![0x94, 0x7d, 0xa1, b'x', 0x01, 0x92, 0x7c, 0xa1, b'x'],
            packed(&exp)
        );
    }

    #[test]
    fn regex() {
        let exp = regex_compare("^a", RegexFlags::ICASE, string_bin("s"));
        assert_eq!(
            vec![0x94, 0x07, 0x02, 0xa2, b'^', b'a', 0x93, 0x51, 0x03, 0xa1, b's'],
            packed(&exp)
        );
    }
}
