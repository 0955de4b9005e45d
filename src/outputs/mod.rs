//! Persisted output.
//!
//! # Submodules
//!
//! - [`sink`]: append-only CSV record sink with per-batch durability
//!
//! # Output Structure
//!
//! ```text
//! lenta-ru-news.csv
//! ├── date,url,topic,tags,title,text     # header, written once
//! ├── 2019-05-06,https://lenta.ru/...    # batch 1
//! ├── ...
//! └── 2019-05-07,https://lenta.ru/...    # batch 2, appended later
//! ```

pub mod sink;
