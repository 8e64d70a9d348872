//! Lattice AST: the `Program` the external parser delivers (spec §3.4,
//! §6.1) and the runtime's own owner of it for the process lifetime, since
//! closures, compiled chunks, and registered bonds/reactions/seeds all
//! borrow into it after evaluation begins.
//!
//! The lexer and parser are out of scope (spec §1); `builders` provides the
//! constructor functions tests and the demonstration CLI use in their
//! place.

pub mod ast;
pub mod builders;
pub mod diagnostic;

pub use ast::*;
pub use diagnostic::Diagnostic;
