use std::borrow::Cow;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Trait for types that can be exported as CSV rows.
///
/// `HEADERS` and `csv_values` must agree in length and order. Implement it
/// through [`impl_csv_record!`](crate::impl_csv_record), which generates both
/// from a single column list.
pub trait CsvRecord {
    /// Column names in export order
    const HEADERS: &'static [&'static str];

    /// Column values in the same order as `HEADERS`
    fn csv_values(&self) -> Vec<Cow<'_, str>>;
}

/// Canonical text form of a single field value.
///
/// A field type with no impl here cannot be exported; the macro fails to
/// compile instead of writing an empty cell.
pub trait ToCsvValue {
    fn to_csv_value(&self) -> Cow<'_, str>;
}

impl ToCsvValue for str {
    fn to_csv_value(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl ToCsvValue for String {
    fn to_csv_value(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.as_str())
    }
}

impl ToCsvValue for Cow<'_, str> {
    fn to_csv_value(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.as_ref())
    }
}

impl<T: ToCsvValue + ?Sized> ToCsvValue for &T {
    fn to_csv_value(&self) -> Cow<'_, str> {
        (**self).to_csv_value()
    }
}

impl<T: ToCsvValue + ?Sized> ToCsvValue for Box<T> {
    fn to_csv_value(&self) -> Cow<'_, str> {
        (**self).to_csv_value()
    }
}

// Absent renders empty; present renders like the non-optional type.
impl<T: ToCsvValue> ToCsvValue for Option<T> {
    fn to_csv_value(&self) -> Cow<'_, str> {
        match self {
            Some(value) => value.to_csv_value(),
            None => Cow::Borrowed(""),
        }
    }
}

macro_rules! display_csv_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ToCsvValue for $ty {
                fn to_csv_value(&self) -> Cow<'_, str> {
                    Cow::Owned(self.to_string())
                }
            }
        )+
    };
}

display_csv_value!(
    i8, i16, i32, i64, i128, isize,
    u8, u16, u32, u64, u128, usize,
    bool, char, Uuid, Decimal, NaiveDate,
);

/// Fixed notation, six fractional digits.
impl ToCsvValue for f64 {
    fn to_csv_value(&self) -> Cow<'_, str> {
        Cow::Owned(format!("{:.6}", self))
    }
}

impl ToCsvValue for f32 {
    fn to_csv_value(&self) -> Cow<'_, str> {
        Cow::Owned(format!("{:.6}", self))
    }
}

impl ToCsvValue for DateTime<Utc> {
    fn to_csv_value(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_rfc3339())
    }
}

impl ToCsvValue for NaiveDateTime {
    fn to_csv_value(&self) -> Cow<'_, str> {
        Cow::Owned(self.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
    }
}

/// Implements [`CsvRecord`] from one ordered list of `"column" => field` pairs.
///
/// ```ignore
/// impl_csv_record!(Order {
///     "order_id" => id,
///     "customer" => customer_name,
///     "total" => total,
/// });
/// ```
#[macro_export]
macro_rules! impl_csv_record {
    ($type:ty { $($header:literal => $field:ident),+ $(,)? }) => {
        impl $crate::domains::export::csv_record::CsvRecord for $type {
            const HEADERS: &'static [&'static str] = &[$($header),+];

            fn csv_values(&self) -> ::std::vec::Vec<::std::borrow::Cow<'_, str>> {
                ::std::vec![
                    $(
                        $crate::domains::export::csv_record::ToCsvValue::to_csv_value(&self.$field)
                    ),+
                ]
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct Invoice {
        number: String,
        amount: f64,
        quantity: Option<i64>,
        paid: bool,
        #[allow(dead_code)]
        internal_note: String,
        issued_at: DateTime<Utc>,
    }

    crate::impl_csv_record!(Invoice {
        "invoice_number" => number,
        "amount" => amount,
        "quantity" => quantity,
        "paid" => paid,
        "issued_at" => issued_at,
    });

    fn invoice() -> Invoice {
        Invoice {
            number: "INV-001".to_string(),
            amount: 1234.5,
            quantity: None,
            paid: true,
            internal_note: "not exported".to_string(),
            issued_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_headers_follow_declaration_order() {
        assert_eq!(
            Invoice::HEADERS,
            &["invoice_number", "amount", "quantity", "paid", "issued_at"]
        );
        assert_eq!(Invoice::HEADERS.len(), invoice().csv_values().len());
    }

    #[test]
    fn test_row_values() {
        let invoice = invoice();
        let values = invoice.csv_values();
        assert_eq!(values[0], "INV-001");
        assert_eq!(values[1], "1234.500000");
        assert_eq!(values[2], "");
        assert_eq!(values[3], "true");
        assert_eq!(values[4], "2024-03-01T12:30:00+00:00");
    }

    #[test]
    fn test_optional_numeric() {
        let unset: Option<i64> = None;
        let set: Option<i64> = Some(42);
        assert_eq!(unset.to_csv_value(), "");
        assert_eq!(set.to_csv_value(), "42");
    }

    #[test]
    fn test_text_passes_through_borrowed() {
        let text = String::from("a,\"b\"\nc");
        assert!(matches!(text.to_csv_value(), Cow::Borrowed("a,\"b\"\nc")));
    }

    #[test]
    fn test_integers_have_no_grouping() {
        assert_eq!(1_000_000i64.to_csv_value(), "1000000");
        assert_eq!((-42i32).to_csv_value(), "-42");
        assert_eq!(u64::MAX.to_csv_value(), "18446744073709551615");
    }

    #[test]
    fn test_floats_use_fixed_notation() {
        assert_eq!(0.1f64.to_csv_value(), "0.100000");
        assert_eq!(1e21f64.to_csv_value(), "1000000000000000000000.000000");
        assert_eq!(1.5e-7f64.to_csv_value(), "0.000000");
        assert_eq!(2.25f32.to_csv_value(), "2.250000");
        assert_eq!(Some(3.0f64).to_csv_value(), "3.000000");
    }

    #[test]
    fn test_other_scalar_kinds() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(id.to_csv_value(), "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(Decimal::new(12345, 2).to_csv_value(), "123.45");
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(date.to_csv_value(), "2024-02-29");
        assert_eq!(date.and_hms_opt(8, 5, 3).unwrap().to_csv_value(), "2024-02-29T08:05:03");
    }
}
