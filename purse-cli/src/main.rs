use anyhow::Result;
use purse_cli::app;

fn main() -> Result<()> {
    app::run()
}
