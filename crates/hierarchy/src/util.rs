use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Writes data atomically by using a temporary sibling file followed by rename.
/// 以臨時檔案搭配 rename 實現原子寫入。
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Splits a stored relative path on either separator style.
/// 以任一種分隔符號拆解儲存的相對路徑。
pub fn split_stored(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(|c: char| c == '/' || c == '\\').filter(|segment| !segment.is_empty())
}

/// Converts a stored path (which may use `\`) into a native path.
/// 把儲存的路徑（可能使用 `\`）轉為本機路徑。
pub fn stored_to_native(raw: &str) -> PathBuf {
    let rooted = raw.starts_with('/') || raw.starts_with('\\');
    let mut path = PathBuf::new();
    if rooted {
        path.push(Path::new("/"));
    }
    let mut segments = split_stored(raw).peekable();
    if let Some(first) = segments.peek() {
        // Drive prefixes such as `C:` stay attached to the following root.
        if first.len() == 2 && first.ends_with(':') {
            path.push(format!("{first}{}", std::path::MAIN_SEPARATOR));
            segments.next();
        }
    }
    for segment in segments {
        path.push(segment);
    }
    path
}

/// Joins a stored path to `base` unless it is already rooted.
/// 若儲存路徑不是絕對路徑，就接在 `base` 後面。
pub fn resolve_stored(base: &Path, raw: &str) -> PathBuf {
    let native = stored_to_native(raw);
    if native.has_root() || native.is_absolute() {
        native
    } else {
        base.join(native)
    }
}

/// Lexically removes `.` and `..` components. Returns `None` when `..`
/// climbs above the root or the path contains a NUL byte.
/// 以字面方式處理 `.` 與 `..`；若 `..` 超出根目錄或含 NUL 字元則回傳 `None`。
pub fn normalize(path: &Path) -> Option<PathBuf> {
    if path.to_string_lossy().contains('\0') {
        return None;
    }
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => return None,
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    Some(out.iter().collect())
}

/// Compares two paths after normalisation, ignoring ASCII case.
/// 正規化後比較兩個路徑，忽略 ASCII 大小寫。
pub fn paths_equal(left: &Path, right: &Path) -> bool {
    let left = normalize(left).unwrap_or_else(|| left.to_path_buf());
    let right = normalize(right).unwrap_or_else(|| right.to_path_buf());
    let mut lhs = left.components();
    let mut rhs = right.components();
    loop {
        match (lhs.next(), rhs.next()) {
            (None, None) => return true,
            (Some(a), Some(b)) => {
                let a = a.as_os_str().to_string_lossy();
                let b = b.as_os_str().to_string_lossy();
                if !a.eq_ignore_ascii_case(&b) {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

/// Makes `path` relative to `base` when it lives inside it.
/// 若 `path` 位於 `base` 之下，回傳相對路徑。
pub fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    let path = normalize(path)?;
    let base = normalize(base)?;
    path.strip_prefix(&base).ok().map(Path::to_path_buf)
}

/// Renders a relative path with `/` separators for storage.
/// 以 `/` 分隔符號輸出要儲存的相對路徑。
pub fn to_stored(path: &Path) -> String {
    if path.is_absolute() {
        return path.to_string_lossy().into_owned();
    }
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
