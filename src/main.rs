fn main() -> anyhow::Result<()> {
    runledger::run()?;
    Ok(())
}
