// Compiles the library and auth protos (server + client) and writes the
// descriptor set served by gRPC reflection.
use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=../proto/library_service.proto");
    println!("cargo:rerun-if-changed=../proto/auth_service.proto");

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

    tonic_build::configure()
        .build_server(true)
        .build_client(true) // Client stubs drive the end-to-end tests
        .file_descriptor_set_path(out_dir.join("medialib_descriptor.bin"))
        .compile_protos(
            &[
                "../proto/library_service.proto",
                "../proto/auth_service.proto",
            ],
            &["../proto"],
        )
        .expect("Failed to compile medialib protos");
}
