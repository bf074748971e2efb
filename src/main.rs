fn main() -> anyhow::Result<()> {
    memoriae::cli::run()
}
