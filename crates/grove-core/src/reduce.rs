//! Narrow numeric columns to the smallest storage type that holds every value
//! exactly

use crate::table::{CellValue, ColumnData, DType, Table};
use tracing::debug;

/// Integer types in the order they are tried
const INTEGER_LADDER: [DType; 7] = [
    DType::UInt8,
    DType::Int8,
    DType::UInt16,
    DType::Int16,
    DType::UInt32,
    DType::Int32,
    DType::Int64,
];

/// The first integer type of the ladder that can hold both `min` and `max`
///
/// At equal width the unsigned type comes first, so non-negative data
/// prefers it.
pub fn smallest_integer_dtype(min: i64, max: i64) -> DType {
    INTEGER_LADDER
        .into_iter()
        .find(|&dtype| fits(dtype, min) && fits(dtype, max))
        .unwrap_or(DType::Int64)
}

fn fits(dtype: DType, value: i64) -> bool {
    match dtype {
        DType::UInt8 => u8::try_from(value).is_ok(),
        DType::Int8 => i8::try_from(value).is_ok(),
        DType::UInt16 => u16::try_from(value).is_ok(),
        DType::Int16 => i16::try_from(value).is_ok(),
        DType::UInt32 => u32::try_from(value).is_ok(),
        DType::Int32 => i32::try_from(value).is_ok(),
        _ => true,
    }
}

/// Storage type a column would be reduced to
///
/// Integer columns pick from the integer ladder by their value range; float
/// columns become `Float32` only if every value survives the narrowing.
/// Non-numeric columns keep their type.
pub fn reduced_dtype(data: &ColumnData) -> DType {
    let dtype = data.dtype();
    if dtype.is_integer() {
        let values: Vec<i64> = data
            .cells()
            .into_iter()
            .filter_map(|cell| match cell {
                CellValue::Integer(i) => Some(i),
                _ => None,
            })
            .collect();
        match (values.iter().min(), values.iter().max()) {
            (Some(&min), Some(&max)) => smallest_integer_dtype(min, max),
            _ => INTEGER_LADDER[0],
        }
    } else if dtype.is_float() {
        if data.cast(DType::Float32).is_ok() {
            DType::Float32
        } else {
            DType::Float64
        }
    } else {
        dtype
    }
}

/// Reduce one column; values are unchanged, only their storage type
pub fn reduce_column(data: &ColumnData) -> ColumnData {
    let target = reduced_dtype(data);
    data.cast(target).unwrap_or_else(|_| data.clone())
}

/// Reduce every numeric column of a table independently
pub fn reduce_table(table: &Table) -> Table {
    let mut reduced = table.clone();
    reduce_table_in_place(&mut reduced);
    reduced
}

/// Like [`reduce_table`], rewriting the table's columns in place
pub fn reduce_table_in_place(table: &mut Table) {
    let before = table.memory_usage();
    for column in table.columns_mut() {
        column.data = reduce_column(&column.data);
    }
    debug!(
        bytes_before = before,
        bytes_after = table.memory_usage(),
        "reduced table storage"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    #[test]
    fn test_smallest_integer_dtype() {
        assert_eq!(smallest_integer_dtype(0, 0), DType::UInt8);
        assert_eq!(smallest_integer_dtype(0, 255), DType::UInt8);
        assert_eq!(smallest_integer_dtype(-1, 127), DType::Int8);
        assert_eq!(smallest_integer_dtype(0, 256), DType::UInt16);
        assert_eq!(smallest_integer_dtype(-129, 0), DType::Int16);
        assert_eq!(smallest_integer_dtype(0, 999_999), DType::UInt32);
        assert_eq!(smallest_integer_dtype(-999_999, 0), DType::Int32);
        assert_eq!(smallest_integer_dtype(0, i64::from(u32::MAX) + 1), DType::Int64);
        assert_eq!(smallest_integer_dtype(i64::MIN, i64::MAX), DType::Int64);
    }

    #[test]
    fn test_reduce_integer_columns() {
        let integers = ColumnData::from(vec![12i64, 999_999, 40_000, 7]);
        assert_eq!(reduce_column(&integers).dtype(), DType::UInt32);

        let negated = ColumnData::from(vec![-12i64, -999_999, -40_000, -7]);
        assert_eq!(reduce_column(&negated).dtype(), DType::Int32);

        let zeros = ColumnData::from(vec![0i64; 10]);
        assert_eq!(reduce_column(&zeros).dtype(), DType::UInt8);
    }

    #[test]
    fn test_reduce_keeps_values_and_nulls() {
        let data = ColumnData::Int64(vec![Some(3), None, Some(250)]);
        let reduced = reduce_column(&data);
        assert_eq!(reduced, ColumnData::UInt8(vec![Some(3), None, Some(250)]));
        assert_eq!(reduced.cells(), data.cells());
    }

    #[test]
    fn test_reduce_floats_only_when_exact() {
        let exact = ColumnData::from(vec![0.5, 1024.25, -3.0]);
        assert_eq!(reduce_column(&exact).dtype(), DType::Float32);

        let inexact = ColumnData::from(vec![0.1, 123_456.789]);
        assert_eq!(reduce_column(&inexact).dtype(), DType::Float64);

        let with_nan = ColumnData::from(vec![f64::NAN, 2.0]);
        assert_eq!(reduce_column(&with_nan).dtype(), DType::Float32);
    }

    #[test]
    fn test_all_null_columns_take_the_narrowest_type() {
        assert_eq!(reduce_column(&ColumnData::Int64(vec![None, None])).dtype(), DType::UInt8);
        assert_eq!(reduce_column(&ColumnData::Float64(vec![None])).dtype(), DType::Float32);
    }

    #[test]
    fn test_reduce_table_leaves_text_alone() {
        let table = Table::new(vec![
            Column::new("integers", vec![1i64, 2, 300]),
            Column::new("floats", vec![1.5, 2.5, 3.5]),
            Column::new("flags", vec![true, false, true]),
            Column::new("names", vec!["a", "b", "c"]),
        ])
        .unwrap();

        let reduced = reduce_table(&table);
        let dtypes: Vec<DType> = reduced.columns().iter().map(Column::dtype).collect();
        assert_eq!(
            dtypes,
            vec![DType::UInt16, DType::Float32, DType::Bool, DType::Utf8]
        );
        assert!(reduced.memory_usage() < table.memory_usage());
        for index in 0..table.row_count() {
            assert_eq!(reduced.row(index), table.row(index));
        }

        let mut in_place = table.clone();
        reduce_table_in_place(&mut in_place);
        assert_eq!(in_place, reduced);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_float() -> impl Strategy<Value = f64> {
        prop_oneof![any::<f32>().prop_map(f64::from), any::<f64>()]
            .prop_filter("NaN never equals itself", |f| !f.is_nan())
    }

    proptest! {
        #[test]
        fn prop_integer_round_trip(values in prop::collection::vec(prop::option::of(any::<i64>()), 0..32)) {
            let data = ColumnData::Int64(values);
            let reduced = reduce_column(&data);
            prop_assert!(reduced.dtype().byte_width() <= DType::Int64.byte_width());
            prop_assert_eq!(reduced.cast(DType::Int64).unwrap(), data);
        }

        #[test]
        fn prop_small_integer_round_trip(values in prop::collection::vec(prop::option::of(-300i64..70_000), 0..32)) {
            let data = ColumnData::Int64(values);
            let reduced = reduce_column(&data);
            prop_assert!(reduced.dtype().byte_width() <= 4);
            prop_assert_eq!(reduced.cast(DType::Int64).unwrap(), data);
        }

        #[test]
        fn prop_float_round_trip(values in prop::collection::vec(prop::option::of(arb_float()), 0..32)) {
            let data = ColumnData::Float64(values);
            let reduced = reduce_column(&data);
            prop_assert!(reduced.dtype().byte_width() <= DType::Float64.byte_width());
            prop_assert_eq!(reduced.cast(DType::Float64).unwrap(), data);
        }
    }
}
