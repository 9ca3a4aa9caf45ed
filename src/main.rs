fn main() -> anyhow::Result<()> {
    combat_ledger::run()
}
