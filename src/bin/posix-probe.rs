use anyhow::Result;

fn main() -> Result<()> {
    posix_support::cli::run()
}
