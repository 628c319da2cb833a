//! FFmpeg `-filter_complex` generation from a compiled graph.
//!
//! Every trimmed clip is shifted to its timeline position with `setpts` /
//! `adelay`, so overlays only need a time window. The bottom of the overlay
//! chain is composited onto an opaque black canvas lasting the whole render;
//! other chain leaves get a transparent canvas so gaps between their clips
//! show the layers underneath.

use std::collections::{HashMap, HashSet};

use crate::error::{MediaError, MediaResult};
use crate::graph::{CompiledGraph, GraphOp, MediaType, StreamRef};

/// Label of the final video stream when the graph has no overlay.
pub const VIDEO_OUT_LABEL: &str = "vout";

/// Everything FFmpeg needs besides encoder settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterScript {
    /// One entry per input: arguments placed before its `-i`, then the URL
    pub inputs: Vec<(Vec<String>, String)>,
    pub filter_complex: String,
    /// `-map` targets, e.g. `[v4]`
    pub maps: Vec<String>,
}

fn secs(value: f64) -> String {
    format!("{:.3}", value)
}

fn ratio(percent: f64) -> String {
    format!("{:.3}", (percent / 100.0).clamp(0.0, 1.0))
}

/// Build the filter script for a graph.
pub fn build_filter_script(graph: &CompiledGraph) -> MediaResult<FilterScript> {
    let spec = &graph.output_spec;
    let duration = secs(graph.duration);

    let inputs = graph
        .inputs
        .iter()
        .map(|input| {
            let mut args = Vec::new();
            if input.kind.is_still() {
                args.extend([
                    "-loop".to_string(),
                    "1".to_string(),
                    "-t".to_string(),
                    secs(input.duration),
                ]);
            }
            (args, input.url.clone())
        })
        .collect();

    // Output label -> (base, overlay) for every Overlay step.
    let overlays: HashMap<&StreamRef, (&StreamRef, &StreamRef)> = graph
        .steps
        .iter()
        .filter_map(|op| match op {
            GraphOp::Overlay { base, overlay, out } => Some((out, (base, overlay))),
            _ => None,
        })
        .collect();

    let bottom = graph.video_out.as_ref().map(|out| {
        let mut current = out;
        while let Some((base, _)) = overlays.get(current) {
            current = base;
        }
        current
    });

    let mut filters = Vec::new();
    let mut known: HashSet<&StreamRef> = HashSet::new();
    let mut windows: HashMap<&StreamRef, (f64, f64)> = HashMap::new();
    let mut canvases = 0usize;

    let require = |known: &HashSet<&StreamRef>, r: &StreamRef| -> MediaResult<()> {
        if known.contains(r) {
            Ok(())
        } else {
            Err(MediaError::invalid_graph(format!(
                "stream {} used before it is produced",
                r.as_str()
            )))
        }
    };

    // Composite a chain leaf onto a full-length canvas, returning the new label.
    let mut composite_leaf = |filters: &mut Vec<String>, leaf: &StreamRef, opaque: bool| {
        let canvas = format!("bg{canvases}");
        canvases += 1;
        let color = if opaque { "black" } else { "black@0.0" };
        let pix_fmt = if opaque { "yuv420p" } else { "yuva420p" };
        filters.push(format!(
            "color=c={color}:s={}x{}:r={}:d={duration},format={pix_fmt}[{canvas}]",
            spec.width, spec.height, spec.fps
        ));
        let label = format!("{}c", leaf.as_str());
        filters.push(format!(
            "[{canvas}][{}]overlay=x=(W-w)/2:y=(H-h)/2:eof_action=pass[{label}]",
            leaf.as_str()
        ));
        label
    };

    for op in &graph.steps {
        match op {
            GraphOp::Trim {
                input,
                media,
                start,
                duration: clip_duration,
                out,
                ..
            } => {
                if *input >= graph.inputs.len() {
                    return Err(MediaError::invalid_graph(format!(
                        "trim references missing input {input}"
                    )));
                }
                let filter = match media {
                    MediaType::Video => format!(
                        "[{input}:v]trim=start=0:duration={},setpts=PTS-STARTPTS+{}/TB,\
                         scale={}:{}:force_original_aspect_ratio=decrease,format=yuva420p[{}]",
                        secs(*clip_duration),
                        secs(*start),
                        spec.width,
                        spec.height,
                        out.as_str()
                    ),
                    MediaType::Audio => {
                        let delay_ms = (start * 1000.0).round() as u64;
                        format!(
                            "[{input}:a]atrim=start=0:duration={},asetpts=PTS-STARTPTS,\
                             adelay={delay_ms}:all=1[{}]",
                            secs(*clip_duration),
                            out.as_str()
                        )
                    }
                };
                filters.push(filter);
                windows.insert(out, (*start, start + clip_duration));
            }
            GraphOp::SetOpacity { input, value, out } => {
                require(&known, input)?;
                filters.push(format!(
                    "[{}]format=yuva420p,colorchannelmixer=aa={}[{}]",
                    input.as_str(),
                    ratio(*value),
                    out.as_str()
                ));
                inherit_window(&mut windows, input, out);
            }
            GraphOp::SetScale { input, factor, out } => {
                require(&known, input)?;
                filters.push(format!(
                    "[{}]scale=iw*{factor:.3}:ih*{factor:.3}[{}]",
                    input.as_str(),
                    out.as_str()
                ));
                inherit_window(&mut windows, input, out);
            }
            GraphOp::SetVolume { input, value, out } => {
                require(&known, input)?;
                filters.push(format!(
                    "[{}]volume={}[{}]",
                    input.as_str(),
                    ratio(*value),
                    out.as_str()
                ));
            }
            GraphOp::Overlay { base, overlay, out } => {
                require(&known, base)?;
                require(&known, overlay)?;

                let base_label = if overlays.contains_key(base) {
                    base.as_str().to_string()
                } else {
                    composite_leaf(&mut filters, base, Some(base) == bottom)
                };
                let (from, to) = windows.get(overlay).copied().unwrap_or((0.0, graph.duration));
                filters.push(format!(
                    "[{base_label}][{}]overlay=x=(W-w)/2:y=(H-h)/2:eof_action=pass:\
                     enable='between(t,{},{})'[{}]",
                    overlay.as_str(),
                    secs(from),
                    secs(to),
                    out.as_str()
                ));

                let base_window = windows.get(base).copied().unwrap_or((from, to));
                windows.insert(out, (base_window.0.min(from), base_window.1.max(to)));
            }
            GraphOp::MixAudio { inputs, out } => {
                let mut labels = String::new();
                for input in inputs {
                    require(&known, input)?;
                    labels.push_str(&format!("[{}]", input.as_str()));
                }
                filters.push(format!(
                    "{labels}amix=inputs={}:duration=longest:normalize=0[{}]",
                    inputs.len(),
                    out.as_str()
                ));
            }
        }
        known.insert(op.output());
    }

    let mut maps = Vec::new();
    if let Some(video_out) = &graph.video_out {
        require(&known, video_out)?;
        if overlays.contains_key(video_out) {
            maps.push(format!("[{}]", video_out.as_str()));
        } else {
            let label = composite_leaf(&mut filters, video_out, true);
            filters.push(format!("[{label}]null[{VIDEO_OUT_LABEL}]"));
            maps.push(format!("[{VIDEO_OUT_LABEL}]"));
        }
    }
    if let Some(audio_out) = &graph.audio_out {
        require(&known, audio_out)?;
        maps.push(format!("[{}]", audio_out.as_str()));
    }

    if maps.is_empty() {
        return Err(MediaError::invalid_graph("graph has no output streams"));
    }

    Ok(FilterScript {
        inputs,
        filter_complex: filters.join(";"),
        maps,
    })
}

fn inherit_window<'a>(
    windows: &mut HashMap<&'a StreamRef, (f64, f64)>,
    input: &StreamRef,
    out: &'a StreamRef,
) {
    if let Some(window) = windows.get(input).copied() {
        windows.insert(out, window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::FiltergraphCompiler;
    use vrender_models::{
        Clip, ClipContent, ContentKind, Timeline, TimelineSettings, Track, TrackKind,
    };

    fn clip(id: &str, start: f64, duration: f64, kind: ContentKind) -> Clip {
        Clip::new(id, start, duration, ClipContent::new(format!("/media/{id}"), kind))
    }

    fn compile(tracks: Vec<Track>) -> CompiledGraph {
        FiltergraphCompiler::default()
            .compile(&Timeline::new(tracks, TimelineSettings::default()))
            .unwrap()
    }

    #[test]
    fn test_single_clip_composited_on_canvas() {
        let graph = compile(vec![Track::new("v", TrackKind::Video, "V")
            .with_clip(clip("a", 2.0, 5.0, ContentKind::Video))]);

        let script = build_filter_script(&graph).unwrap();
        assert_eq!(script.inputs.len(), 1);
        assert!(script.filter_complex.contains("trim=start=0:duration=5.000"));
        assert!(script.filter_complex.contains("setpts=PTS-STARTPTS+2.000/TB"));
        assert!(script
            .filter_complex
            .contains("color=c=black:s=1920x1080:r=30:d=7.000"));
        assert_eq!(script.maps, vec![format!("[{VIDEO_OUT_LABEL}]")]);
    }

    #[test]
    fn test_overlay_and_mix_filters() {
        let graph = compile(vec![
            Track::new("v", TrackKind::Video, "V").with_clip(clip("a", 0.0, 10.0, ContentKind::Video)),
            Track::new("i", TrackKind::Image, "Logo").with_clip(
                clip("logo", 1.0, 3.0, ContentKind::Image)
                    .with_opacity(50.0)
                    .with_scale(0.25),
            ),
            Track::new("m", TrackKind::Audio, "M")
                .with_clip(clip("m", 1.5, 4.0, ContentKind::Audio).with_volume(80.0)),
        ]);

        let script = build_filter_script(&graph).unwrap();
        let fc = &script.filter_complex;

        assert_eq!(script.inputs[1].0, vec!["-loop", "1", "-t", "3.000"]);
        assert!(fc.contains("colorchannelmixer=aa=0.500"));
        assert!(fc.contains("scale=iw*0.250:ih*0.250"));
        assert!(fc.contains("enable='between(t,1.000,4.000)'"));
        assert!(fc.contains("adelay=1500:all=1"));
        assert!(fc.contains("volume=0.800"));
        assert!(fc.contains("amix=inputs=1:duration=longest:normalize=0"));
        assert_eq!(fc.matches("color=c=black:").count(), 1);
        assert_eq!(script.maps.len(), 2);
    }

    #[test]
    fn test_upper_track_with_gaps_uses_transparent_canvas() {
        let graph = compile(vec![
            Track::new("v", TrackKind::Video, "V").with_clip(clip("a", 0.0, 10.0, ContentKind::Video)),
            Track::new("o", TrackKind::Avatar, "O")
                .with_clip(clip("b", 0.0, 2.0, ContentKind::Avatar))
                .with_clip(clip("c", 6.0, 2.0, ContentKind::Avatar)),
        ]);

        let fc = build_filter_script(&graph).unwrap().filter_complex;
        assert!(fc.contains("color=c=black@0.0:"));
        assert_eq!(fc.matches("color=c=black:").count(), 1);
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let mut graph = compile(vec![Track::new("v", TrackKind::Video, "V")
            .with_clip(clip("a", 0.0, 1.0, ContentKind::Video))]);
        graph.steps.push(GraphOp::SetScale {
            input: StreamRef::video(99),
            factor: 2.0,
            out: StreamRef::video(100),
        });

        assert!(matches!(
            build_filter_script(&graph),
            Err(MediaError::InvalidGraph(_))
        ));
    }
}
