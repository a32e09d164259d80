// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logging facade for the fprint crates.
//!
//! With the `log` feature enabled, the macros forward to the `log` crate and the application
//! chooses the sink (tests and tools typically install `env_logger`). Without it, every call
//! compiles to nothing.

#[cfg(not(feature = "log"))]
mod custom {
    #[macro_export]
    macro_rules! trace {
        ($($args: expr),*$(,)?) => { if false { $(let _ = $args;)* } };
    }

    #[macro_export]
    macro_rules! debug {
        ($($args: expr),*$(,)?) => { if false { $(let _ = $args;)* } };
    }

    #[macro_export]
    macro_rules! info {
        ($($args: expr),*$(,)?) => { if false { $(let _ = $args;)* } };
    }

    #[macro_export]
    macro_rules! warn {
        ($($args: expr),*$(,)?) => { if false { $(let _ = $args;)* } };
    }

    #[macro_export]
    macro_rules! error {
        ($($args: expr),*$(,)?) => { if false { $(let _ = $args;)* } };
    }
}

#[cfg(feature = "log")]
pub use log::{debug, error, info, trace, warn};

#[cfg(feature = "log")]
pub fn flush() {
    log::logger().flush();
}
#[cfg(not(feature = "log"))]
pub fn flush() {}
