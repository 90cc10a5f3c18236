//! Command line options.

use std::path::PathBuf;

use anyhow::{bail, Context};

/// Where the compiled shaders are looked up by default.
pub const DEFAULT_SHADER_DIR: &str = "build/shaders";

/// Parsed viewer options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerOptions {
    /// PNG (or any format `image` decodes) used as the cube texture.
    pub texture: Option<PathBuf>,
    /// Directory holding `triangle.vert.spv` and `triangle.frag.spv`.
    pub shader_dir: PathBuf,
    pub vsync: bool,
    /// `None` keeps the build-profile default.
    pub validation: Option<bool>,
    pub help: bool,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            texture: None,
            shader_dir: PathBuf::from(DEFAULT_SHADER_DIR),
            vsync: false,
            validation: None,
            help: false,
        }
    }
}

impl ViewerOptions {
    /// Parse options from the process arguments.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::parse(std::env::args().skip(1))
    }

    /// Parse options, excluding the program name.
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => options.help = true,
                "--vsync" => options.vsync = true,
                "--validation" => options.validation = Some(true),
                "--no-validation" => options.validation = Some(false),
                "--texture" => {
                    let path = args.next().context("--texture needs a path")?;
                    options.texture = Some(PathBuf::from(path));
                }
                "--shaders" => {
                    let dir = args.next().context("--shaders needs a directory")?;
                    options.shader_dir = PathBuf::from(dir);
                }
                other => bail!("Unknown option '{other}' (see --help)"),
            }
        }

        Ok(options)
    }

    pub fn vertex_shader(&self) -> PathBuf {
        self.shader_dir.join("triangle.vert.spv")
    }

    pub fn fragment_shader(&self) -> PathBuf {
        self.shader_dir.join("triangle.frag.spv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ViewerOptions> {
        ViewerOptions::parse(args.iter().map(|s| (*s).to_string()))
    }

    #[test]
    fn defaults() {
        let options = parse(&[]).unwrap();
        assert_eq!(options, ViewerOptions::default());
        assert_eq!(
            options.vertex_shader(),
            PathBuf::from("build/shaders/triangle.vert.spv")
        );
    }

    #[test]
    fn flags_and_values() {
        let options = parse(&[
            "--vsync",
            "--texture",
            "dirt.png",
            "--shaders",
            "out",
            "--no-validation",
        ])
        .unwrap();

        assert!(options.vsync);
        assert_eq!(options.texture, Some(PathBuf::from("dirt.png")));
        assert_eq!(options.fragment_shader(), PathBuf::from("out/triangle.frag.spv"));
        assert_eq!(options.validation, Some(false));
    }

    #[test]
    fn missing_value_is_an_error() {
        assert!(parse(&["--texture"]).is_err());
        assert!(parse(&["--shaders"]).is_err());
    }

    #[test]
    fn unknown_option_is_an_error() {
        let err = parse(&["--fullscreen"]).unwrap_err();
        assert!(err.to_string().contains("--fullscreen"));
    }
}
