use crate::{Hash, store::StoreFeatures};
use base64::Engine;

const BLOB_PREFIX: &str = "blobs/";

fn encode_hash(hash: Hash, features: &StoreFeatures) -> String {
    if features.case_sensitive {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash)
    } else {
        let mut output: Vec<u8> = Vec::with_capacity(base32_fs::encoded_len(Hash::SIZE));
        base32_fs::encode(hash.as_bytes(), &mut output);
        // base32_fs only emits ASCII
        output.into_iter().map(char::from).collect()
    }
}

/// Relative path of a blob, fanned out into subdirectories on stores
/// that prefer small directories.
pub fn blob_path_for_hash(hash: Hash, features: &StoreFeatures) -> String {
    let hash_str = encode_hash(hash, features);

    let rel = if features.recommended_max_dir_size < 10000 {
        format!("{}/{}/{}", &hash_str[0..2], &hash_str[2..4], &hash_str[4..])
    } else {
        hash_str
    };
    format!("{BLOB_PREFIX}{rel}")
}

/// Inverse of [`blob_path_for_hash`]. Returns `None` for foreign paths.
pub fn hash_from_blob_path(path: &str, features: &StoreFeatures) -> Option<Hash> {
    let rest = path.strip_prefix(BLOB_PREFIX)?;
    let encoded: String = rest.chars().filter(|&c| c != '/').collect();
    if encoded.is_empty() {
        return None;
    }

    let bytes = if features.case_sensitive {
        base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .ok()?
    } else {
        if !base32_fs::is_valid(encoded.as_bytes()) {
            return None;
        }
        let len = base32_fs::decoded_len(encoded.len())?;
        let mut out = Vec::with_capacity(len);
        base32_fs::decode(encoded.as_bytes(), &mut out).ok()?;
        out
    };

    let arr: [u8; 32] = bytes.try_into().ok()?;
    Some(Hash::from_bytes(arr))
}
