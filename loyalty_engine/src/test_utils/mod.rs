//! Utilities for preparing throwaway databases in tests. Not used in production code paths.

pub mod prepare_env;
