fn main() -> anyhow::Result<()> {
    pandemic_sim::runner::run_with_args()?;
    Ok(())
}
