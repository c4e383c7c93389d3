//! Display/parse round-trip laws and comparator agreement properties

use proptest::prelude::*;
use ramscan::{CompareOp, CompareSpec, Comparator, TypedValue, ValueKind};

macro_rules! int_roundtrip {
    ($name:ident, $ty:ty, $variant:ident, $kind:expr) => {
        proptest! {
            #[test]
            fn $name(v in any::<$ty>()) {
                for hex in [false, true] {
                    let value = TypedValue::$variant(v);
                    let text = value.to_display_string(hex);
                    let parsed = TypedValue::from_string(&text, $kind, hex).unwrap();
                    prop_assert_eq!(parsed, value);
                }
            }
        }
    };
}

int_roundtrip!(prop_i8_roundtrip, i8, I8, ValueKind::I8);
int_roundtrip!(prop_u8_roundtrip, u8, U8, ValueKind::U8);
int_roundtrip!(prop_i16_roundtrip, i16, I16, ValueKind::I16);
int_roundtrip!(prop_u16_roundtrip, u16, U16, ValueKind::U16);
int_roundtrip!(prop_i32_roundtrip, i32, I32, ValueKind::I32);
int_roundtrip!(prop_u32_roundtrip, u32, U32, ValueKind::U32);
int_roundtrip!(prop_i64_roundtrip, i64, I64, ValueKind::I64);
int_roundtrip!(prop_u64_roundtrip, u64, U64, ValueKind::U64);

proptest! {
    #[test]
    fn prop_f32_roundtrip(v in any::<f32>().prop_filter("nan", |v| !v.is_nan())) {
        for hex in [false, true] {
            let value = TypedValue::F32(v);
            let text = value.to_display_string(hex);
            let parsed = TypedValue::from_string(&text, ValueKind::F32, hex).unwrap();
            prop_assert_eq!(parsed, value);
        }
    }

    #[test]
    fn prop_f64_roundtrip(v in any::<f64>().prop_filter("nan", |v| !v.is_nan())) {
        for hex in [false, true] {
            let value = TypedValue::F64(v);
            let text = value.to_display_string(hex);
            let parsed = TypedValue::from_string(&text, ValueKind::F64, hex).unwrap();
            prop_assert_eq!(parsed, value);
        }
    }

    #[test]
    fn prop_bytes_roundtrip(bytes in proptest::collection::vec(any::<u8>(), 0..=64)) {
        for hex in [false, true] {
            let value = TypedValue::Bytes(bytes.clone());
            let text = value.to_display_string(hex);
            let parsed = TypedValue::from_string(&text, ValueKind::Bytes, hex).unwrap();
            prop_assert_eq!(parsed, value.clone());
        }
    }

    #[test]
    fn prop_comparator_agrees_with_native_i16(a in any::<i16>(), b in any::<i16>()) {
        let cases: [(CompareOp, bool); 6] = [
            (CompareOp::Equal, a == b),
            (CompareOp::NotEqual, a != b),
            (CompareOp::Less, a < b),
            (CompareOp::Greater, a > b),
            (CompareOp::LessEqual, a <= b),
            (CompareOp::GreaterEqual, a >= b),
        ];
        for (op, expected) in cases {
            let spec = CompareSpec::previous(ValueKind::I16, op);
            let cmp = Comparator::configure(&spec).unwrap();
            prop_assert_eq!(
                cmp.check_previous(&a.to_le_bytes(), &b.to_le_bytes()),
                expected
            );
        }
    }

    #[test]
    fn prop_different_by_agrees_with_wrapping_sub(
        cur in any::<u32>(),
        prev in any::<u32>(),
        delta in any::<u32>()
    ) {
        let spec = CompareSpec::different_by(ValueKind::U32, TypedValue::U32(delta));
        let cmp = Comparator::configure(&spec).unwrap();
        prop_assert_eq!(
            cmp.check_previous(&cur.to_le_bytes(), &prev.to_le_bytes()),
            cur.wrapping_sub(prev) == delta
        );
    }
}
