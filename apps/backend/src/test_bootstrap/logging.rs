#![cfg(test)]

//! Unit-test logging. Shares the integration tests' initializer so both
//! honour `TEST_LOG` / `RUST_LOG` the same way.

pub fn init() {
    backend_test_support::logging::init();
}
