use rand::seq::SliceRandom;

use crate::emotion::PrimaryEmotion;

const UNSPLASH_SUFFIX: &str = "?w=1600&h=900&fit=crop";

fn photo_ids(emotion: PrimaryEmotion) -> &'static [&'static str] {
    match emotion {
        PrimaryEmotion::Joy => &[
            "photo-1507003211169-0a1dd7228f2d",
            "photo-1501854140801-50d01698950b",
            "photo-1469474968028-56623f02e42e",
        ],
        PrimaryEmotion::Hope => &[
            "photo-1495616811223-4d98c6e9c869",
            "photo-1470252649378-9c29740c9fa8",
            "photo-1500534314209-a25ddb2bd429",
        ],
        PrimaryEmotion::Sadness => &[
            "photo-1499346030926-9a72daac6c63",
            "photo-1428908728789-d2de25dbd4e2",
            "photo-1515224526905-51c7d77c7bb8",
        ],
        PrimaryEmotion::Anxiety => &[
            "photo-1425913397330-cf8af2ff40a1",
            "photo-1418065460487-3e41a6c84dc5",
            "photo-1502082553048-f009c37129b9",
        ],
        PrimaryEmotion::Anger => &[
            "photo-1509635022432-0220ac12960b",
            "photo-1527482937786-6f73e8c33f03",
            "photo-1534088568595-a066f410bcda",
        ],
        PrimaryEmotion::Fear => &[
            "photo-1518241353330-0f7941c2d9b5",
            "photo-1507400492013-162706c8c05e",
            "photo-1478760329108-5c3ed9d495a0",
        ],
        PrimaryEmotion::Calm => &[
            "photo-1506905925346-21bda4d32df4",
            "photo-1439066615861-d1af74d74000",
            "photo-1507525428034-b723cf961d3e",
        ],
        PrimaryEmotion::Confusion => &[
            "photo-1485236715568-ddc5ee6ca227",
            "photo-1531315630201-bb15abeb1653",
            "photo-1422393462206-207b0fbd8d6b",
        ],
        PrimaryEmotion::Gratitude => &[
            "photo-1470071459604-3b5ec3a7fe05",
            "photo-1501854140801-50d01698950b",
            "photo-1447752875215-b2761acb3c5d",
        ],
        PrimaryEmotion::Love => &[
            "photo-1518568814500-bf0f8d125f46",
            "photo-1516589178581-6cd7833ae3b2",
            "photo-1490750967868-88aa4486c946",
        ],
        PrimaryEmotion::Peace => &[
            "photo-1505765050516-f72dcac9c60e",
            "photo-1433086966358-54859d0ed716",
            "photo-1418065460487-3e41a6c84dc5",
        ],
        PrimaryEmotion::Loneliness => &[
            "photo-1507400492013-162706c8c05e",
            "photo-1476611338391-6f395a0ebc7b",
            "photo-1499002238440-d264edd596ec",
        ],
        PrimaryEmotion::Frustration => &[
            "photo-1527482937786-6f73e8c33f03",
            "photo-1509635022432-0220ac12960b",
            "photo-1428908728789-d2de25dbd4e2",
        ],
        PrimaryEmotion::Determination => &[
            "photo-1464822759023-fed622ff2c3b",
            "photo-1454496522488-7a8e488e8606",
            "photo-1519681393784-d120267933ba",
        ],
        PrimaryEmotion::Grief => &[
            "photo-1499346030926-9a72daac6c63",
            "photo-1515224526905-51c7d77c7bb8",
            "photo-1428908728789-d2de25dbd4e2",
        ],
    }
}

const DEFAULT_PHOTO_ID: &str = "photo-1506905925346-21bda4d32df4";

fn photo_url(id: &str) -> String {
    format!("https://images.unsplash.com/{id}{UNSPLASH_SUFFIX}")
}

fn resolve(emotion: &str) -> PrimaryEmotion {
    PrimaryEmotion::parse(emotion).unwrap_or(PrimaryEmotion::Calm)
}

/// Curated landscape URLs for an emotion label; unknown labels get calm's set.
pub fn curated_images(emotion: &str) -> Vec<String> {
    photo_ids(resolve(emotion))
        .iter()
        .map(|id| photo_url(id))
        .collect()
}

/// Uniform random pick from the emotion's curated set. The only
/// intentionally random choice in the pipeline.
pub fn pick_fallback_image(emotion: &str) -> String {
    let id = photo_ids(resolve(emotion))
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(DEFAULT_PHOTO_ID);
    photo_url(id)
}
