// SPDX-License-Identifier: Apache-2.0

fn main() -> std::process::ExitCode {
    fedschema::run()
}
