fn main() -> anyhow::Result<()> {
    sp_cli::run()
}
