//! Contract-from-source - HTTP contract inference for Go Echo services.
//!
//! This library statically infers the HTTP contract of a web service built
//! on the Echo framework — which functions are handlers, what each handler
//! binds as request input, and what status codes, content types and payload
//! shapes it can emit — directly from the service's Go source code, without
//! executing any handler and without hand-written annotations.
//!
//! # Architecture
//!
//! The library is organized into modules that work together:
//!
//! 1. [`scanner`] - Expands search patterns and loads Go packages
//! 2. [`parser`] - Parses Go source files into syntax trees
//! 3. [`typing`] - Type index and expression typing over the parsed set
//! 4. [`resolver`] - Status-code and MIME symbol resolvers
//! 5. [`extractor`] - Handler classification and contract extraction
//! 6. [`finder`] - Concurrent package analysis and the merged handler index
//! 7. [`demangle`] - Mangled registration-name recovery
//! 8. [`matcher`] - Reconciliation of live routes with discovered handlers
//! 9. [`serializer`] - YAML/JSON output of the extracted facts
//!
//! # Example Usage
//!
//! ```no_run
//! use contract_from_source::finder::{FinderOptions, HandlerFinder};
//! use contract_from_source::matcher::Route;
//! use contract_from_source::scanner::SearchPattern;
//! use contract_from_source::serializer::serialize_yaml;
//! use std::path::PathBuf;
//!
//! // Discover handlers under the project
//! let mut finder = HandlerFinder::new(PathBuf::from("./my-service")).unwrap();
//! finder
//!     .find(&[SearchPattern::parse("internal/api/...")], &FinderOptions::default())
//!     .unwrap();
//!
//! // Match routes captured from the live router
//! let routes: Vec<Route> =
//!     serde_json::from_str(&std::fs::read_to_string("routes.json").unwrap()).unwrap();
//! let matches = finder.match_routes(&routes);
//!
//! // Serialize for the downstream spec renderer
//! let yaml = serialize_yaml(&matches).unwrap();
//! println!("{}", yaml);
//! ```
//!
//! # Command-Line Interface
//!
//! For command-line usage, see the [`cli`] module which provides a complete
//! CLI application.

pub mod cli;
pub mod demangle;
pub mod error;
pub mod extractor;
pub mod finder;
pub mod matcher;
pub mod meta;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod serializer;
pub mod typing;
