// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Built-in machine descriptors.
//!
//! The assembler core is machine-agnostic; these modules supply ready-made
//! [`MachineDescriptor`](crate::core::machine::MachineDescriptor) values
//! for the CLI and the test suite. Embedding applications are expected to
//! provide their own descriptors the same way.

pub mod micro16;
pub mod micro8;

use crate::core::machine::MachineDescriptor;

/// Look up a built-in machine by name (case-insensitive).
#[must_use]
pub fn by_name(name: &str) -> Option<MachineDescriptor> {
    match name.to_ascii_lowercase().as_str() {
        "micro16" => Some(micro16::descriptor()),
        "micro8" => Some(micro8::descriptor()),
        _ => None,
    }
}

/// Names accepted by [`by_name`].
pub fn machine_names() -> Vec<&'static str> {
    vec!["micro16", "micro8"]
}

#[cfg(test)]
mod tests {
    use super::{by_name, machine_names};
    use crate::core::machine::MachineTables;

    #[test]
    fn all_listed_machines_resolve() {
        for name in machine_names() {
            assert!(by_name(name).is_some(), "missing machine {name}");
        }
        assert!(by_name("MICRO16").is_some());
        assert!(by_name("pdp11").is_none());
    }

    #[test]
    fn built_in_descriptors_validate() {
        for name in machine_names() {
            let machine = by_name(name).unwrap();
            MachineTables::build(&machine, false)
                .unwrap_or_else(|err| panic!("{name}: {}", err.message));
        }
    }
}
