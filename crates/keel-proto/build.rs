// Build script to compile the protobuf definitions into Rust code.
//
// Runs at compile time and generates the message structs plus the Log
// service client and server stubs from proto/keel.proto. Bytes fields are
// generated as `bytes::Bytes` so record payloads move without copying.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = prost_build::Config::new();
    config.bytes(["."]);

    tonic_build::configure().compile_protos_with_config(
        config,
        &["proto/keel.proto"],
        &["proto"],
    )?;

    Ok(())
}
