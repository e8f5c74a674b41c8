use std::io;
use std::path::Path;

/// Copy the static asset tree rooted at `source` into `dest`, recursively.
/// If `dest` already exists it is removed first, per spec §4.6, so stale
/// files from a previous generation never linger.
pub fn copy_static_assets(source: &Path, dest: &Path) -> io::Result<()> {
    if !source.exists() {
        return Ok(());
    }
    if dest.exists() {
        std::fs::remove_dir_all(dest)?;
    }
    copy_dir_recursive(source, dest)
}

fn copy_dir_recursive(source: &Path, dest: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let dest_path = dest.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &dest_path)?;
        } else {
            std::fs::copy(entry.path(), &dest_path)?;
        }
    }
    Ok(())
}
