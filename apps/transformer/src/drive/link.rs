/// Extracts a folder id from a shareable Drive link.
///
/// Takes the last `/`-separated segment and drops any query string, so
/// `https://drive.google.com/drive/folders/FOLDERID?usp=sharing` → `FOLDERID`.
/// A bare id passes through unchanged.
pub fn extract_folder_id(link: &str) -> &str {
    let last_segment = link.trim().rsplit('/').next().unwrap_or_default();
    last_segment.split('?').next().unwrap_or_default()
}
