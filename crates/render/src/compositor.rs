//! Variant compositor: one redacted copy of a frame per detection subset.

use mosaic_model::{Detection, Frame, RedactionVariant, VariantRequest};

use crate::redact::Redaction;

/// Redact every detection onto `frame`, in order.
///
/// Returns the clipped detections that were actually written. Degenerate
/// boxes are skipped and left out of the returned list. On overlap the last
/// applied detection wins.
pub fn apply_detections(
    frame: &mut Frame,
    detections: &[Detection],
    redaction: &Redaction,
) -> Vec<Detection> {
    let (width, height) = frame.dimensions();
    let mut applied = Vec::with_capacity(detections.len());

    for detection in detections {
        let Some(clipped) = detection.clip_to(width, height) else {
            tracing::trace!(bbox = ?detection.bbox(), "Skipping degenerate region");
            continue;
        };
        if redaction.apply(frame, &clipped.bbox()).is_some() {
            applied.push(clipped);
        }
    }

    applied
}

/// Build one variant per request, each from its own clone of `source`.
///
/// `source` is only read; no variant can observe another's writes.
pub fn compose(
    source: &Frame,
    requests: &[VariantRequest],
    redaction: &Redaction,
) -> Vec<RedactionVariant> {
    requests
        .iter()
        .map(|request| {
            let mut frame = source.clone();
            let applied = apply_detections(&mut frame, &request.detections, redaction);
            tracing::debug!(
                variant = %request.name,
                requested = request.detections.len(),
                applied = applied.len(),
                "Variant composited"
            );
            RedactionVariant::new(request.name.clone(), frame, applied)
        })
        .collect()
}

/// Single-variant form that consumes the frame instead of cloning it.
///
/// Used by the video loop, where the source frame is not needed afterwards.
pub fn compose_owned(
    mut frame: Frame,
    request: VariantRequest,
    redaction: &Redaction,
) -> RedactionVariant {
    let applied = apply_detections(&mut frame, &request.detections, redaction);
    RedactionVariant::new(request.name, frame, applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use mosaic_model::{canonical_requests, PixelBox, VARIANT_ALL, VARIANT_FACES_ONLY};

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    const GRAY: Rgb<u8> = Rgb([90, 90, 90]);

    #[test]
    fn test_variants_are_isolated() {
        let source = Frame::from_pixel(64, 64, GRAY);
        let faces = vec![Detection::new("face", 0.9, PixelBox::new(0, 0, 10, 10))];
        let plates = vec![Detection::new("plate", 0.8, PixelBox::new(40, 40, 60, 60))];

        let requests = canonical_requests(&faces, &plates);
        let variants = compose(&source, &requests, &Redaction::default());

        assert_eq!(variants[0].name(), VARIANT_ALL);
        assert_eq!(variants[0].frame().get_pixel(50, 50), &WHITE);
        assert_eq!(variants[0].frame().get_pixel(5, 5), &WHITE);

        assert_eq!(variants[1].name(), VARIANT_FACES_ONLY);
        assert_eq!(variants[1].frame().get_pixel(50, 50), &GRAY);
        assert_eq!(variants[1].frame().get_pixel(5, 5), &WHITE);

        assert!(source.pixels().all(|p| *p == GRAY));
    }

    #[test]
    fn test_degenerate_boxes_not_reported_as_applied() {
        let mut frame = Frame::from_pixel(32, 32, GRAY);
        let dets = vec![
            Detection::new("face", 0.9, PixelBox::new(40, 40, 60, 60)),
            Detection::new("face", 0.7, PixelBox::new(-5, -5, 8, 8)),
        ];
        let applied = apply_detections(&mut frame, &dets, &Redaction::default());

        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].bbox(), PixelBox::new(0, 0, 8, 8));
        assert_eq!(applied[0].confidence(), 0.7);
    }

    #[test]
    fn test_overlapping_boxes_both_applied() {
        let mut frame = Frame::from_pixel(64, 64, GRAY);
        let dets = vec![
            Detection::new("face", 0.9, PixelBox::new(10, 10, 40, 40)),
            Detection::new("face", 0.6, PixelBox::new(15, 15, 35, 35)),
        ];
        let applied = apply_detections(&mut frame, &dets, &Redaction::default());

        assert_eq!(applied.len(), 2);
        for y in 10..40 {
            for x in 10..40 {
                assert_eq!(frame.get_pixel(x, y), &WHITE);
            }
        }
    }

    #[test]
    fn test_compose_owned_matches_compose() {
        let source = Frame::from_fn(48, 48, |x, y| Rgb([x as u8, y as u8, 7]));
        let request = VariantRequest::new(
            VARIANT_ALL,
            vec![Detection::new("plate", 0.5, PixelBox::new(4, 4, 30, 20))],
        );
        let redaction = Redaction::Pixelate { block_size: 8 };

        let cloned = compose(&source, std::slice::from_ref(&request), &redaction);
        let owned = compose_owned(source.clone(), request, &redaction);
        assert_eq!(cloned[0].frame(), owned.frame());
        assert_eq!(cloned[0].detections_applied(), owned.detections_applied());
    }
}
