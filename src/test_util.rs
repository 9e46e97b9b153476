// Copyright © 2025 Cyberus Technology GmbH
// Copyright © 2026 The Guest VMM Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use clap::Command;

/// Fails if the arguments of `cmd` are not declared in alphabetical order
/// of their ids.
pub fn assert_args_sorted(cmd: &Command) {
    let ids: Vec<&str> = cmd
        .get_arguments()
        .map(|arg| arg.get_id().as_str())
        .filter(|id| *id != "help" && *id != "version")
        .collect();
    for pair in ids.windows(2) {
        assert!(
            pair[0] <= pair[1],
            "args not alphabetically sorted: arg={}, next={}",
            pair[0],
            pair[1]
        );
    }
}
