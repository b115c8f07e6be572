use cfg_aliases::cfg_aliases;

fn main() {
    // Add alias to see if any MPEG audio layer is enabled
    // This prevents having to copy/paste the feature list each time
    cfg_aliases! {
        mpeg_layer: {
            any(
                feature = "mp1",
                feature = "mp2",
                feature = "mp3"
            )
        }
    }
}
