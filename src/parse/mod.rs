pub mod table;

pub use table::{
    header_row, map_rows, parse_table, Dataset, Record, BORDERED_BODY_ROWS, BORDERED_ROWS,
};
