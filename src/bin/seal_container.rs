//! Seals a PKCS#12 file with `MASTER_KEY` for enrollment.
//!
//! Usage: `seal_container <input.p12> <output.p12.sealed>`
//!
//! With `P12_PASSPHRASE` set, the container is also decoded and the
//! certificate metadata needed for the `certificates` row is printed as JSON.

use anyhow::{Context, bail};
use zeroize::Zeroizing;

use medsign::config::load_master_key;
use medsign::crypto::aes::{self, SecureKey};
use medsign::crypto::pkcs12::{KeyMaterialCodec, Pkcs12Codec};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let [_, input, output] = args.as_slice() else {
        bail!("usage: seal_container <input.p12> <output.p12.sealed>");
    };

    let master_key = load_master_key()?;
    let key = SecureKey::from_slice(&master_key)?;

    let container = Zeroizing::new(
        std::fs::read(input).with_context(|| format!("Failed to read {}", input))?,
    );

    let sealed = aes::seal(&key, &container)?;
    std::fs::write(output, &sealed).with_context(|| format!("Failed to write {}", output))?;
    eprintln!("✅ Sealed {} -> {} ({} bytes)", input, output, sealed.len());

    if let Ok(passphrase) = std::env::var("P12_PASSPHRASE") {
        let passphrase = Zeroizing::new(passphrase);
        let material = Pkcs12Codec.decode(&container, &passphrase)?;
        let details = material.certificate();

        let metadata = sonic_rs::to_string(&sonic_rs::json!({
            "subjectDn": details.subject_dn,
            "issuerDn": details.issuer_dn,
            "serialNumber": details.serial_number,
            "notBefore": details.not_before,
            "notAfter": details.not_after,
            "publicKey": hex::encode(&details.public_key),
            "caCertificates": material.chain_len(),
        }))?;
        println!("{}", metadata);
    }

    Ok(())
}
