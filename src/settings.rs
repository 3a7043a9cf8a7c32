use structopt::StructOpt;

/// Tuning knobs of the texturing pipeline. All of these are pure inputs;
/// nothing is read from the environment inside the core.
#[derive(Clone, Copy, Debug, StructOpt)]
pub struct Settings {
    #[structopt(
        help = "Potts smoothness penalty for view selection",
        long,
        default_value = "20.0"
    )]
    pub smoothness_weight: f64,

    #[structopt(
        help = "Data cost bias against low projected resolution",
        long,
        default_value = "1.0"
    )]
    pub resolution_bias: f64,

    #[structopt(
        help = "Data cost bias against image border proximity",
        long,
        default_value = "0.5"
    )]
    pub edge_bias: f64,

    #[structopt(
        help = "Width of the border proximity ramp in pixels",
        long,
        default_value = "20.0"
    )]
    pub edge_ramp: f64,

    #[structopt(help = "Keep faces not seen by any view", long)]
    pub keep_unseen_faces: bool,

    #[structopt(
        help = "Gray level used to fill patches of unseen faces",
        long,
        default_value = "64"
    )]
    pub unseen_fill_level: u8,

    #[structopt(
        help = "Atlas page dimension in pixels",
        long,
        default_value = "4096"
    )]
    pub atlas_size: u32,

    #[structopt(
        help = "Padding around packed patches in pixels",
        long,
        default_value = "3"
    )]
    pub atlas_padding: u32,

    #[structopt(
        help = "Margin around extracted patch rasters in pixels",
        long,
        default_value = "2"
    )]
    pub patch_margin: u32,

    #[structopt(
        help = "Blending band radius for local seam leveling",
        long,
        default_value = "8.0"
    )]
    pub seam_band_radius: f64,

    #[structopt(
        help = "Sweep limit for the labeling solver",
        long,
        default_value = "100"
    )]
    pub labeling_sweep_limit: usize,

    #[structopt(
        help = "Conjugate gradient steps for global seam leveling",
        long,
        default_value = "200"
    )]
    pub leveling_steps: usize,

    #[structopt(
        help = "Zero-change regularization for global seam leveling",
        long,
        default_value = "0.1"
    )]
    pub leveling_regularization: f64,

    #[structopt(help = "Downscale patches exceeding the atlas size", long)]
    pub downscale_oversize_patches: bool,

    #[structopt(help = "Emit a view assignment visualization model", long)]
    pub write_view_assignment: bool,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            smoothness_weight: 20.0,
            resolution_bias: 1.0,
            edge_bias: 0.5,
            edge_ramp: 20.0,
            keep_unseen_faces: false,
            unseen_fill_level: 64,
            atlas_size: 4096,
            atlas_padding: 3,
            patch_margin: 2,
            seam_band_radius: 8.0,
            labeling_sweep_limit: 100,
            leveling_steps: 200,
            leveling_regularization: 0.1,
            downscale_oversize_patches: false,
            write_view_assignment: false,
        }
    }
}
