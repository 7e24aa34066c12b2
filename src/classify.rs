use crate::resource::ResourceSubtype;

/// Classify a document link by its anchor text
pub fn classify_link(link_text: &str) -> ResourceSubtype {
    let text = link_text.to_lowercase();
    if text.contains("slide") {
        ResourceSubtype::Slides
    } else if text.contains("note") || text.contains("lecture") {
        ResourceSubtype::Notes
    } else {
        ResourceSubtype::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slides() {
        assert_eq!(classify_link("Slides.pdf"), ResourceSubtype::Slides);
        assert_eq!(classify_link("Lecture 3 SLIDES"), ResourceSubtype::Slides);
    }

    #[test]
    fn test_notes() {
        assert_eq!(classify_link("Lecture Notes.pdf"), ResourceSubtype::Notes);
        assert_eq!(classify_link("lecture 12"), ResourceSubtype::Notes);
        assert_eq!(classify_link("Recitation NOTES"), ResourceSubtype::Notes);
    }

    #[test]
    fn test_unknown() {
        assert_eq!(classify_link("Handout.pdf"), ResourceSubtype::Unknown);
        assert_eq!(classify_link(""), ResourceSubtype::Unknown);
    }
}
