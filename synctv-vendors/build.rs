fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Client stubs only; the vendor service itself lives elsewhere
    tonic_prost_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(&["proto/emby.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/emby.proto");

    Ok(())
}
