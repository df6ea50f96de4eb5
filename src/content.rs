//! Rendering and parsing of the pull-request title and body this engine
//! generates. Matching an existing pull request relies on parsing back what
//! was rendered here, so both directions live side by side.

/// PR body rendering and package-table parsing.
pub mod body;

/// PR title templates and the title-similarity heuristic.
pub mod title;
