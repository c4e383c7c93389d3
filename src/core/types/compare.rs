//! Comparison engine: compiles a (kind, operator) pair into monomorphic
//! predicates usable in the scan hot loop
//!
//! `Comparator::configure` runs once per scan pass (the operator, kind or
//! constant may change between passes) and selects a function pair bound to
//! the concrete native type. Candidates are raw little-endian byte windows.

use super::error::{MemoryResult, ScanError};
use super::value::{TypedValue, ValueKind};
use serde::{Deserialize, Serialize};

/// Comparison operator applied at every candidate element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    DifferentBy,
}

/// Full description of one scan pass's comparison
///
/// `constant` is present only when comparing against a fixed value rather
/// than the previous pass's recorded value; `delta` only for `DifferentBy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareSpec {
    pub kind: ValueKind,
    pub op: CompareOp,
    pub constant: Option<TypedValue>,
    pub delta: Option<TypedValue>,
}

impl CompareSpec {
    /// A previous-value comparison with no constant
    pub fn previous(kind: ValueKind, op: CompareOp) -> Self {
        CompareSpec {
            kind,
            op,
            constant: None,
            delta: None,
        }
    }

    /// A comparison against a fixed value
    pub fn against(kind: ValueKind, op: CompareOp, constant: TypedValue) -> Self {
        CompareSpec {
            kind,
            op,
            constant: Some(constant),
            delta: None,
        }
    }

    /// A `DifferentBy` comparison with the given delta
    pub fn different_by(kind: ValueKind, delta: TypedValue) -> Self {
        CompareSpec {
            kind,
            op: CompareOp::DifferentBy,
            constant: None,
            delta: Some(delta),
        }
    }

    /// Byte width of one candidate element. Fixed-width kinds use the kind
    /// width; array/string kinds take it from the reference value.
    pub fn element_width(&self) -> MemoryResult<usize> {
        if let Some(width) = self.kind.byte_width() {
            return Ok(width);
        }
        match &self.constant {
            Some(c) if c.byte_len() > 0 => Ok(c.byte_len()),
            _ => Err(ScanError::Config(
                "array/string scans require a non-empty reference value".to_string(),
            )),
        }
    }
}

type CheckConstFn = Box<dyn Fn(&[u8]) -> bool + Send + Sync>;
type CheckPrevFn = Box<dyn Fn(&[u8], &[u8]) -> bool + Send + Sync>;

/// A configured predicate pair for one scan pass
pub struct Comparator {
    width: usize,
    check_constant_fn: CheckConstFn,
    check_previous_fn: CheckPrevFn,
}

impl Comparator {
    /// Selects the predicate pair for the spec; re-run at the start of
    /// every scan pass
    pub fn configure(spec: &CompareSpec) -> MemoryResult<Self> {
        let width = spec.element_width()?;

        if let Some(constant) = &spec.constant {
            if constant.kind() != spec.kind {
                return Err(ScanError::Config(format!(
                    "constant kind {:?} does not match scan kind {:?}",
                    constant.kind(),
                    spec.kind
                )));
            }
        }
        if spec.op == CompareOp::DifferentBy {
            match &spec.delta {
                Some(delta) if delta.kind() == spec.kind => {}
                Some(delta) => {
                    return Err(ScanError::Config(format!(
                        "delta kind {:?} does not match scan kind {:?}",
                        delta.kind(),
                        spec.kind
                    )))
                }
                None => {
                    return Err(ScanError::Config(
                        "DifferentBy requires a delta value".to_string(),
                    ))
                }
            }
        }

        let (check_constant_fn, check_previous_fn) = match spec.kind {
            ValueKind::I8 => scalar_fns::<i8>(spec)?,
            ValueKind::U8 => scalar_fns::<u8>(spec)?,
            ValueKind::I16 => scalar_fns::<i16>(spec)?,
            ValueKind::U16 => scalar_fns::<u16>(spec)?,
            ValueKind::I32 => scalar_fns::<i32>(spec)?,
            ValueKind::U32 => scalar_fns::<u32>(spec)?,
            ValueKind::I64 => scalar_fns::<i64>(spec)?,
            ValueKind::U64 => scalar_fns::<u64>(spec)?,
            ValueKind::F32 => scalar_fns::<f32>(spec)?,
            ValueKind::F64 => scalar_fns::<f64>(spec)?,
            ValueKind::Bytes | ValueKind::CString => byte_fns(spec, width)?,
        };

        Ok(Comparator {
            width,
            check_constant_fn,
            check_previous_fn,
        })
    }

    /// Byte width of one candidate element
    pub fn width(&self) -> usize {
        self.width
    }

    /// Tests a candidate against the configured constant
    #[inline]
    pub fn check_constant(&self, candidate: &[u8]) -> bool {
        (self.check_constant_fn)(candidate)
    }

    /// Tests a candidate against its recorded previous value
    #[inline]
    pub fn check_previous(&self, candidate: &[u8], previous: &[u8]) -> bool {
        (self.check_previous_fn)(candidate, previous)
    }
}

impl std::fmt::Debug for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Comparator")
            .field("width", &self.width)
            .finish()
    }
}

/// Native types a scalar scan can be bound to
trait ScanScalar: Copy + PartialOrd + PartialEq + Send + Sync + 'static {
    fn load(bytes: &[u8]) -> Option<Self>;
    fn from_value(value: &TypedValue) -> Option<Self>;
    fn delta_eq(current: Self, previous: Self, delta: Self) -> bool;
    fn zero() -> Self;
}

macro_rules! impl_scan_scalar_int {
    ($($ty:ty => $variant:ident),*) => {
        $(impl ScanScalar for $ty {
            fn load(bytes: &[u8]) -> Option<Self> {
                let raw: [u8; std::mem::size_of::<$ty>()] =
                    bytes.get(..std::mem::size_of::<$ty>())?.try_into().ok()?;
                Some(<$ty>::from_le_bytes(raw))
            }
            fn from_value(value: &TypedValue) -> Option<Self> {
                match value {
                    TypedValue::$variant(v) => Some(*v),
                    _ => None,
                }
            }
            fn delta_eq(current: Self, previous: Self, delta: Self) -> bool {
                current.wrapping_sub(previous) == delta
            }
            fn zero() -> Self {
                0
            }
        })*
    };
}

macro_rules! impl_scan_scalar_float {
    ($($ty:ty => $variant:ident),*) => {
        $(impl ScanScalar for $ty {
            fn load(bytes: &[u8]) -> Option<Self> {
                let raw: [u8; std::mem::size_of::<$ty>()] =
                    bytes.get(..std::mem::size_of::<$ty>())?.try_into().ok()?;
                Some(<$ty>::from_le_bytes(raw))
            }
            fn from_value(value: &TypedValue) -> Option<Self> {
                match value {
                    TypedValue::$variant(v) => Some(*v),
                    _ => None,
                }
            }
            fn delta_eq(current: Self, previous: Self, delta: Self) -> bool {
                current - previous == delta
            }
            fn zero() -> Self {
                0.0
            }
        })*
    };
}

impl_scan_scalar_int!(i8 => I8, u8 => U8, i16 => I16, u16 => U16,
                      i32 => I32, u32 => U32, i64 => I64, u64 => U64);
impl_scan_scalar_float!(f32 => F32, f64 => F64);

fn scalar_fns<T: ScanScalar>(spec: &CompareSpec) -> MemoryResult<(CheckConstFn, CheckPrevFn)> {
    let constant = match &spec.constant {
        Some(value) => T::from_value(value).ok_or_else(|| {
            ScanError::Config(format!("constant does not fit kind {:?}", spec.kind))
        })?,
        None => T::zero(),
    };
    let delta = match &spec.delta {
        Some(value) => T::from_value(value).ok_or_else(|| {
            ScanError::Config(format!("delta does not fit kind {:?}", spec.kind))
        })?,
        None => T::zero(),
    };
    let has_constant = spec.constant.is_some();

    let check_constant: CheckConstFn = match spec.op {
        CompareOp::Equal => Box::new(move |c| {
            has_constant && T::load(c).map_or(false, |v| v == constant)
        }),
        CompareOp::NotEqual => Box::new(move |c| {
            has_constant && T::load(c).map_or(false, |v| v != constant)
        }),
        CompareOp::Less => Box::new(move |c| {
            has_constant && T::load(c).map_or(false, |v| v < constant)
        }),
        CompareOp::Greater => Box::new(move |c| {
            has_constant && T::load(c).map_or(false, |v| v > constant)
        }),
        CompareOp::LessEqual => Box::new(move |c| {
            has_constant && T::load(c).map_or(false, |v| v <= constant)
        }),
        CompareOp::GreaterEqual => Box::new(move |c| {
            has_constant && T::load(c).map_or(false, |v| v >= constant)
        }),
        CompareOp::DifferentBy => Box::new(move |c| {
            has_constant && T::load(c).map_or(false, |v| T::delta_eq(v, constant, delta))
        }),
    };

    let check_previous: CheckPrevFn = match spec.op {
        CompareOp::Equal => Box::new(load2(|c, p: T| c == p)),
        CompareOp::NotEqual => Box::new(load2(|c, p: T| c != p)),
        CompareOp::Less => Box::new(load2(|c, p: T| c < p)),
        CompareOp::Greater => Box::new(load2(|c, p: T| c > p)),
        CompareOp::LessEqual => Box::new(load2(|c, p: T| c <= p)),
        CompareOp::GreaterEqual => Box::new(load2(|c, p: T| c >= p)),
        CompareOp::DifferentBy => {
            Box::new(load2(move |c, p: T| T::delta_eq(c, p, delta)))
        }
    };

    Ok((check_constant, check_previous))
}

fn load2<T: ScanScalar>(
    op: impl Fn(T, T) -> bool + Send + Sync + 'static,
) -> impl Fn(&[u8], &[u8]) -> bool + Send + Sync + 'static {
    move |candidate, previous| match (T::load(candidate), T::load(previous)) {
        (Some(c), Some(p)) => op(c, p),
        _ => false,
    }
}

/// Array/string kinds compare their raw bytes lexicographically
fn byte_fns(spec: &CompareSpec, width: usize) -> MemoryResult<(CheckConstFn, CheckPrevFn)> {
    if spec.op == CompareOp::DifferentBy {
        return Err(ScanError::Config(
            "DifferentBy is not defined for array/string kinds".to_string(),
        ));
    }

    let reference: Vec<u8> = spec.constant.as_ref().map(|c| c.to_bytes()).unwrap_or_default();
    let has_constant = spec.constant.is_some();
    let op = spec.op;

    let check_constant: CheckConstFn = Box::new(move |candidate| {
        if !has_constant || candidate.len() < width {
            return false;
        }
        byte_op(op, &candidate[..width], &reference)
    });

    let check_previous: CheckPrevFn = Box::new(move |candidate, previous| {
        if candidate.len() < width || previous.len() < width {
            return false;
        }
        byte_op(op, &candidate[..width], &previous[..width])
    });

    Ok((check_constant, check_previous))
}

fn byte_op(op: CompareOp, lhs: &[u8], rhs: &[u8]) -> bool {
    match op {
        CompareOp::Equal => lhs == rhs,
        CompareOp::NotEqual => lhs != rhs,
        CompareOp::Less => lhs < rhs,
        CompareOp::Greater => lhs > rhs,
        CompareOp::LessEqual => lhs <= rhs,
        CompareOp::GreaterEqual => lhs >= rhs,
        CompareOp::DifferentBy => false,
    }
}
