//! Utility functions

/// Characters that are illegal in file names on common filesystems
const ILLEGAL_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Sanitize a single path component for use as a directory or file name
///
/// Replaces characters illegal on common filesystems with underscores and
/// strips leading/trailing whitespace and trailing dots (Windows rejects
/// names ending in a dot or space).
///
/// # Examples
///
/// ```
/// use gallery_dl::utils::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("My Gallery: Vol. 2"), "My Gallery_ Vol. 2");
/// assert_eq!(sanitize_file_name("trailing dots..."), "trailing dots");
/// ```
pub fn sanitize_file_name(component: &str) -> String {
    let sanitized: String = component
        .chars()
        .map(|c| {
            if ILLEGAL_FILENAME_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    sanitized
        .trim()
        .trim_end_matches(['.', ' '])
        .to_string()
}
