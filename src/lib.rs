// Copyright © 2025 Cyberus Technology GmbH
// Copyright © 2026 The Guest VMM Authors
//
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::io::{self, Write};

/// Writes `top_error` and every error in its source chain, numbered from the
/// outermost, followed by the debug representation.
pub fn write_error_chain(
    out: &mut dyn Write,
    top_error: &dyn Error,
    component: &str,
) -> io::Result<()> {
    write!(out, "Error: {component} exited with the following ")?;
    if top_error.source().is_none() {
        writeln!(out, "error:")?;
        writeln!(out, "  {top_error}")?;
    } else {
        writeln!(out, "chain of errors:")?;
        for (level, error) in
            std::iter::successors(Some(top_error), |sub_error| (*sub_error).source()).enumerate()
        {
            writeln!(out, "  {level}: {error}")?;
        }
    }

    writeln!(out)?;
    writeln!(out, "Debug Info: {top_error:?}")
}

/// Prints a chain of errors to stderr.
pub fn cli_print_error_chain(top_error: &dyn Error, component: &str) {
    // Nothing sensible is left to do if stderr itself fails.
    let _ = write_error_chain(&mut io::stderr().lock(), top_error, component);
}

#[cfg(test)]
mod tests {
    use thiserror::Error;

    use super::*;

    #[derive(Debug, Error)]
    enum Inner {
        #[error("Device tree 'linux-dtb' not found")]
        Missing,
    }

    #[derive(Debug, Error)]
    enum Outer {
        #[error("Cannot load the guest device tree")]
        Load(#[source] Inner),
        #[error("Unknown board")]
        Board,
    }

    fn render(e: &dyn Error) -> String {
        let mut out = Vec::new();
        write_error_chain(&mut out, e, "guest-vmm").unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_single_error() {
        let text = render(&Outer::Board);
        assert!(text.starts_with(
            "Error: guest-vmm exited with the following error:\n  Unknown board\n"
        ));
        assert!(text.contains("Debug Info: Board"));
    }

    #[test]
    fn test_error_chain() {
        let text = render(&Outer::Load(Inner::Missing));
        assert!(text.contains("chain of errors:"));
        assert!(text.contains("  0: Cannot load the guest device tree\n"));
        assert!(text.contains("  1: Device tree 'linux-dtb' not found\n"));
    }
}
