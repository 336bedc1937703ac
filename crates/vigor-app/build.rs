use std::{env, fs, path::PathBuf};

// Compiles the scene shaders into OUT_DIR; main.rs embeds them as the
// defaults when the config doesn't point at SPIR-V files.
fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());
    let shaders = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap()).join("../../shaders");

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_1 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    for (name, kind) in [
        ("tri.vert", shaderc::ShaderKind::Vertex),
        ("tri.frag", shaderc::ShaderKind::Fragment),
    ] {
        let path = shaders.join(name);
        println!("cargo:rerun-if-changed={}", path.display());
        let src = fs::read_to_string(&path).unwrap();
        let spv = comp
            .compile_into_spirv(&src, kind, name, "main", Some(&opts))
            .unwrap();
        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8()).unwrap();
    }
}
