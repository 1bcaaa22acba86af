//! Build script to compile the WGSL shaders to SPIR-V.

use std::env;
use std::fs;
use std::path::Path;

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let shader_dir = Path::new("shaders");

    // Rerun if shaders change
    println!("cargo:rerun-if-changed=shaders/");

    compile_shader(
        &shader_dir.join("base.vert.wgsl"),
        &Path::new(&out_dir).join("base.vert.spv"),
        naga::ShaderStage::Vertex,
    );
    compile_shader(
        &shader_dir.join("base.frag.wgsl"),
        &Path::new(&out_dir).join("base.frag.spv"),
        naga::ShaderStage::Fragment,
    );
}

fn compile_shader(input: &Path, output: &Path, stage: naga::ShaderStage) {
    let source = fs::read_to_string(input)
        .unwrap_or_else(|e| panic!("Failed to read shader {}: {e}", input.display()));

    let module = naga::front::wgsl::parse_str(&source).unwrap_or_else(|e| {
        panic!(
            "Failed to parse shader {}:\n{}",
            input.display(),
            e.emit_to_string(&source)
        )
    });

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator
        .validate(&module)
        .unwrap_or_else(|e| panic!("Invalid shader {}: {e}", input.display()));

    let options = naga::back::spv::Options {
        lang_version: (1, 3),
        ..Default::default()
    };
    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: stage,
        entry_point: "main".to_string(),
    };
    let words = naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))
        .unwrap_or_else(|e| panic!("Failed to emit SPIR-V for {}: {e}", input.display()));

    let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
    fs::write(output, bytes)
        .unwrap_or_else(|e| panic!("Failed to write shader {}: {e}", output.display()));
}
