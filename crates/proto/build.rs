//! Build script for generating the score stream protocol code.

use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_root = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?).join("proto");

    // Fall back to the bundled protoc unless the environment provides one.
    if env::var_os("PROTOC").is_none() {
        env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    let well_known = protoc_bin_vendored::include_path()?;

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .type_attribute(
            ".scorestream",
            "#[derive(serde::Serialize, serde::Deserialize)]",
        )
        .type_attribute(
            ".",
            "#[allow(clippy::all, clippy::pedantic, clippy::nursery)]",
        )
        .server_attribute(
            ".",
            "#[allow(clippy::all, clippy::pedantic, clippy::nursery)]",
        )
        .client_attribute(
            ".",
            "#[allow(clippy::all, clippy::pedantic, clippy::nursery)]",
        )
        .compile_protos(
            &[proto_root.join("scorestream/v1/score.proto")],
            &[proto_root.clone(), well_known],
        )?;

    println!("cargo:rerun-if-changed={}", proto_root.display());
    Ok(())
}
