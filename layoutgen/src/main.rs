use std::process::ExitCode;

use clap::Parser;
use error_stack::ResultExt;

mod compile;
mod dump;
mod error;
mod schema;

/// Layout Generator
///
/// Tool for compiling versioned class layout schemas into offset tables and accessor code.
#[derive(Debug, Clone, clap::Parser)]
pub struct CLI {
    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Subcommand {
    /// Compile a schema document into a Rust source file with layout tables and accessors
    Compile(compile::CompileCLI),
    /// Print the compiled layout tables of a schema document as JSON
    Dump(dump::DumpCLI),
}

fn main() -> ExitCode {
    common::init_logging();
    let CLI { subcommand } = CLI::parse();
    match subcommand {
        Subcommand::Compile(cli) => common::run(|| {
            compile::run_cli(cli)
                .attach_printable_lazy(|| "See `layoutgen compile --help` for more information")
        }),
        Subcommand::Dump(cli) => common::run(|| {
            dump::run_cli(cli)
                .attach_printable_lazy(|| "See `layoutgen dump --help` for more information")
        }),
    }
}
