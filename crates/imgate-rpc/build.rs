fn main() {
    std::env::set_var("PROTOC", protobuf_src::protoc());

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .out_dir("src/generated")
        .compile_protos(&["protos/message_service.proto"], &["protos/"])
        .unwrap_or_else(|e| panic!("failed to compile protos: {e}"));

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=protos/");
}
