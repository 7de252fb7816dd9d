use crate::error::Result;
use crate::scene::SceneState;
use std::path::Path;

pub fn save_scene_to_file(scene: &SceneState, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(scene)?;
    std::fs::write(path, json)?;
    log::info!("saved scene \"{}\" to {}", scene.name(), path.display());
    Ok(())
}

pub fn load_scene_from_file(path: &Path) -> Result<SceneState> {
    let json = std::fs::read_to_string(path)?;
    let scene: SceneState = serde_json::from_str(&json)?;
    log::info!(
        "loaded scene \"{}\" ({} objects) from {}",
        scene.name(),
        scene.len(),
        path.display()
    );
    Ok(scene)
}
