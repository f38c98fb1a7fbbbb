fn main() -> anyhow::Result<()> {
    healthsync_lib::run()
}
