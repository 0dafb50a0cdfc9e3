fn main() -> anyhow::Result<()> {
    typst_mcp_server::run_main()
}
