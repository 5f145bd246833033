//! # CLI Module
//!
//! Command-line tooling for operators of the filter.
//!
//! ## Commands
//!
//! ### `decode`
//!
//! Print the header and claims of a token without verifying it:
//!
//! ```bash
//! brrtgate decode eyJhbGciOiJSUzI1NiJ9.eyJzdWIiOiJ4In0.c2ln
//! ```
//!
//! ### `check`
//!
//! Run the filter once, with a plugin configuration file, against a
//! synthetic request, and print the outcome as JSON:
//!
//! ```bash
//! brrtgate check \
//!     --config oauth.yaml \
//!     --header "Bearer $TOKEN" \
//!     --proxy pets --base-path /v1/pets --path /v1/pets/owners/7
//! ```
//!
//! The `BRRTGATE_*` environment toggles apply exactly as they would in the
//! gateway.

mod commands;


pub use commands::{check_request, decode_token, execute, run_cli, CheckArgs, Cli, Commands};
