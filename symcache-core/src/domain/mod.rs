//! Domain types: symbols, feeds, manual datapoints, series and their
//! index/data-kind strategies.

pub mod datakind;
pub mod feed;
pub mod index;
pub mod kwargs;
pub mod orfs;
pub mod series;
pub mod symbol;

pub use datakind::{DataKind, DataKindError};
pub use feed::{column_name, Feed, FeedDraft, FeedState, MungeKind, MungeStep, SourceSpec};
pub use index::{IndexError, IndexKind, IndexSpec, IndexValue};
pub use kwargs::{kwargs, ArgError, KwargValue, Kwargs};
pub use orfs::{latest_per_index, OrfDraft, OrfEntry, OrfKind};
pub use series::{Point, Series};
pub use symbol::{Symbol, ValidatorSpec, DEFAULT_AGG_METHOD};
