mod header_page;

pub use header_page::{HeaderView, HeaderViewMut, MAX_HEADER_RECORDS};
