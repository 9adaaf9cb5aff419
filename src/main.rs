fn main() -> anyhow::Result<()> {
    coderunner::cli::run()
}
