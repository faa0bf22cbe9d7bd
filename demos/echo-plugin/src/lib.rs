//! Echo Plugin - a minimal telehost plugin
//!
//! Build with `cargo build --release --target wasm32-unknown-unknown` and drop
//! the resulting `echo_plugin.wasm` into a plugin directory.

use telehost_plugin_sdk::prelude::*;

struct Echo;

impl Plugin for Echo {
    fn manifest() -> PluginManifest {
        PluginManifest::new()
            .name("echo")
            .description("Repeats what you say")
            .command(CommandSpec::new("echo", "Echoes its arguments").usage("echo <text>"))
            .command(CommandSpec::new("shout", "Echoes its arguments in capitals"))
            .ignore_edited()
    }

    fn invoke(invocation: Invocation) -> ExecuteResult {
        match invocation {
            Invocation::Command { command, args, .. } => {
                if args.is_empty() {
                    return ExecuteResult::error("nothing to echo");
                }
                let text = args.join(" ");
                if command == "shout" {
                    ExecuteResult::reply(text.to_uppercase())
                } else {
                    ExecuteResult::reply(text)
                }
            }
            _ => ExecuteResult::Silent,
        }
    }
}

export_plugin!(Echo);
