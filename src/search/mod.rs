//! Remote search module - live recursive search over a remote tree / 远程搜索模块
//!
//! - matcher: name and content matching, relevance scoring
//! - filter: extension / size / modified-time predicates, text-kind allow-list
//! - engine: depth-first traversal under result caps, result ordering
//!
//! Nothing is indexed or cached; every search re-walks the tree.

pub mod engine;
pub mod filter;
pub mod matcher;
pub mod schema;

pub use engine::{aggregate, search, SearchEngine, SearchError};
pub use filter::{is_text_kind, TEXT_EXTENSIONS};
pub use matcher::{match_content, match_name, score_relevance, QueryMatcher};
pub use schema::{ContentMatch, ResultKind, SearchRequest, SearchResult};
