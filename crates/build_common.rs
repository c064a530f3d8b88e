// Shared build helper: fold a crate's README.md into its rustdoc.
// Pulled into each build.rs with: include!("../build_common.rs");
//
// The including file must `use std::{env, fs, path::Path};`.

/// Rewrite README links for rustdoc and write the result to `OUT_DIR`.
///
/// Source links like `](src/decoder.rs)` become module links
/// (`](decoder)`) so rustdoc can resolve them.
fn render_readme_for_rustdoc(crate_dir: &str) {
    println!("cargo:rerun-if-changed=README.md");

    let readme = Path::new(crate_dir).join("README.md");
    let content = fs::read_to_string(&readme).unwrap_or_default();

    let rendered = content.replace("](src/", "](").replace(".rs)", ")");

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    fs::write(Path::new(&out_dir).join("README_GENERATED.md"), rendered)
        .expect("writable OUT_DIR");
}
