//! Renders `model.json` into `$OUT_DIR/model.rs` so the emitted code is
//! compiled and exercised by this crate's tests.
use std::path::Path;

use anyhow::Context;
use shape_synth::emit::{self, rust::RustBackend};
use shape_synth::{generate_all, source, GenerationSettings, Registry};

fn main() -> anyhow::Result<()> {
    let model_path = Path::new("model.json");
    println!("cargo:rerun-if-changed={}", model_path.display());
    let model = source::load_path(model_path).context("loading model.json")?;

    let mut backend = RustBackend::default();
    for generated in generate_all(&model, &GenerationSettings::default(), Registry::standard()) {
        let plan = generated.result.with_context(|| format!("generating {}", generated.shape))?;
        emit::render(&plan, &mut backend);
    }
    let out = Path::new(&std::env::var("OUT_DIR")?).join("model.rs");
    std::fs::write(&out, backend.finish()).with_context(|| format!("writing {}", out.display()))?;
    Ok(())
}
