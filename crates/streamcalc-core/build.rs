/// Builds the gRPC client and server code for the calculator, greeter and blog
/// protocols using `tonic-prost-build`.
///
/// This code generation step processes the Protocol Buffer definitions located
/// in the `proto` directory and emits Rust modules with gRPC bindings into the
/// crate's `OUT_DIR`, one module per protobuf package.
///
/// # Descriptor set
///
/// A combined, encoded `FileDescriptorSet` is written next to the generated
/// code as `streamcalc_descriptor.bin`. The server registers it with
/// `tonic-reflection` so tools like `grpcurl` can discover every service
/// without a local copy of the `.proto` files.
///
/// # Panics
///
/// This function will `panic!` if code generation fails, which aborts the
/// build with the `protoc` diagnostic.
///
/// # Output
///
/// Generated code will be accessible in Rust via:
///
/// ```rust
/// pub mod calculator {
///     tonic::include_proto!("calculator");
/// }
/// ```
use std::env;
use std::path::PathBuf;

const PROTOS: &[&str] = &[
    "proto/calculator.proto",
    "proto/greet.proto",
    "proto/blog.proto",
];

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("streamcalc_descriptor.bin");

    for proto in PROTOS {
        println!("cargo:rerun-if-changed={proto}");
    }

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, PROTOS, &["proto"])
        .unwrap();
}
