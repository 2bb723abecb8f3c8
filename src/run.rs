use std::error::Error;
use std::fs;
use std::path::Path;

use glam::Vec2;
use indicatif::{ProgressBar, ProgressStyle};
use inkflow_sim::{RenderMode, SimConfig, Simulation};
use ndarray::Array3;

pub fn run(
    config: SimConfig,
    width: u32,
    height: u32,
    frames: u32,
    mode: RenderMode,
    out_dir: &Path,
    snapshot_every: u32,
) -> Result<(), Box<dyn Error>> {
    let mut sim = Simulation::new(config, width, height)?;
    sim.set_render_mode(mode);

    fs::create_dir_all(out_dir)?;

    let bar_template =
        "Running simulation {spinner:.green} [{elapsed}] [{bar:50.white/white}] {pos}/{len} ({eta})";
    let style = ProgressStyle::with_template(bar_template)?;
    let bar = ProgressBar::new(frames as u64).with_style(style);

    // Synthetic pointer stirring the fluid along a circle, standing in for
    // the interactive host's pointer events.
    let center = Vec2::new(width as f32, height as f32) / 2.0;
    let radius = 0.3 * width.min(height) as f32;
    let pointer = |frame: u32| {
        let theta = frame as f32 * 0.05;
        center + radius * Vec2::new(theta.cos(), theta.sin())
    };

    let mut last = pointer(0);

    for frame in 0..frames {
        let current = pointer(frame + 1);
        sim.inject_force(current, last);
        last = current;

        sim.step()?;

        let capture = if snapshot_every == 0 {
            frame + 1 == frames
        } else {
            (frame + 1) % snapshot_every == 0 || frame + 1 == frames
        };
        if capture {
            sim.request_snapshot();
        }

        if sim.take_snapshot_request() {
            let path = out_dir.join(format!("frame_{:05}.png", frame + 1));
            save_png(&sim.render(), &path)?;
            log::info!("wrote {}", path.display());
        }

        bar.inc(1);
    }

    bar.finish();
    Ok(())
}

fn save_png(frame: &Array3<u8>, path: &Path) -> Result<(), Box<dyn Error>> {
    let (h, w, _) = frame.dim();
    let data = frame
        .as_slice()
        .map(<[u8]>::to_vec)
        .unwrap_or_else(|| frame.iter().copied().collect());

    let img = image::RgbImage::from_raw(w as u32, h as u32, data)
        .ok_or("rendered frame has the wrong size for its dimensions")?;
    img.save(path)?;
    Ok(())
}
