fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Prefer a protoc from the environment, fall back to the vendored binary.
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    let mut config = prost_build::Config::new();
    config.retain_enum_prefix();

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos_with_config(config, &["proto/netplay.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/netplay.proto");
    Ok(())
}
