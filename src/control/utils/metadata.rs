use std::time::SystemTime;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

pub struct MetadataConverter;

impl MetadataConverter {
    /// Dimensione leggibile, passo 1024, una cifra decimale.
    pub fn format_size(bytes: u64) -> String {
        let mut size = bytes as f64;
        for unit in SIZE_UNITS {
            if size < 1024.0 {
                return format!("{size:.1} {unit}");
            }
            size /= 1024.0;
        }
        format!("{size:.1} PB")
    }

    pub fn format_modified(modified: Option<SystemTime>) -> String {
        match modified {
            Some(time) => {
                let datetime = chrono::DateTime::<chrono::Local>::from(time);
                datetime.format("%Y-%m-%d %H:%M").to_string()
            }
            None => "unknown".to_string(),
        }
    }

    /// Tronca un'etichetta a `max` caratteri senza spezzare caratteri UTF-8.
    pub fn short_label(name: &str, max: usize) -> String {
        if name.chars().count() <= max {
            name.to_string()
        } else {
            name.chars().take(max).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_climb_the_unit_ladder() {
        assert_eq!(MetadataConverter::format_size(0), "0.0 B");
        assert_eq!(MetadataConverter::format_size(1023), "1023.0 B");
        assert_eq!(MetadataConverter::format_size(1024), "1.0 KB");
        assert_eq!(MetadataConverter::format_size(1536), "1.5 KB");
        assert_eq!(MetadataConverter::format_size(50 * 1024 * 1024), "50.0 MB");
        assert_eq!(MetadataConverter::format_size(3 * 1024_u64.pow(4)), "3.0 TB");
        assert_eq!(MetadataConverter::format_size(2 * 1024_u64.pow(5)), "2.0 PB");
    }

    #[test]
    fn labels_are_cut_on_char_boundaries() {
        assert_eq!(MetadataConverter::short_label("résumé.txt", 3), "rés");
        assert_eq!(MetadataConverter::short_label("a", 30), "a");
    }
}
