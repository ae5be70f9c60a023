//! # Kardex Command Line Entry Point
//!
//! ```text
//! kardex location add "Depósito"
//! kardex product add "Parafuso M6" --sku PAR-1 --cost 0.25 --stock Depósito=100
//! kardex stock transfer PAR-1 Depósito Loja 20
//! kardex stock exit PAR-1 Loja 3 --reason venda
//! kardex ledger PAR-1
//! kardex report abc --days 30
//! ```
//!
//! Setup lives in `lib.rs` for testability.

use std::process::ExitCode;

use clap::Parser;

use kardex_cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    kardex_cli::run(Cli::parse()).await
}
