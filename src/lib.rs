pub mod error;
pub mod config;
pub mod storage;
pub mod vfs;
pub mod tabular;

pub use config::VaultConfig;
pub use error::{VaultError, VaultResult};
pub use storage::{StoreHandle, StoreSettings};
pub use vfs::{TypedArray, Value, Vault};

// Test-only printing helper: expands to eprintln! during tests and is absent otherwise.
// Usage in tests: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In non-test builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
