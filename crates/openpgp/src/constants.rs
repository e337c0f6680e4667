//! Constants for the OpenPGP card application

/// OpenPGP application identifier (RID D2 76 00 01 24, application 01)
pub const OPENPGP_AID: [u8; 6] = [0xD2, 0x76, 0x00, 0x01, 0x24, 0x01];

/// Interindustry class byte
pub const CLA_ISO: u8 = 0x00;

/// Instruction bytes
pub mod ins {
    /// SELECT
    pub const SELECT: u8 = 0xA4;
    /// GET DATA
    pub const GET_DATA: u8 = 0xCA;
    /// VERIFY
    pub const VERIFY: u8 = 0x20;
    /// PERFORM SECURITY OPERATION
    pub const PSO: u8 = 0x2A;
}

/// P1/P2 pairs for PERFORM SECURITY OPERATION
pub mod pso {
    /// PSO: DECIPHER
    pub const DECIPHER: (u8, u8) = (0x80, 0x86);
    /// PSO: COMPUTE DIGITAL SIGNATURE
    pub const COMPUTE_DIGITAL_SIGNATURE: (u8, u8) = (0x9E, 0x9A);
}

/// Data object tags
pub mod tags {
    /// Full application identifier, including the card serial number (GET DATA)
    pub const AID: u16 = 0x004F;
    /// Uniform resource locator of the public key (GET DATA)
    pub const URL: u16 = 0x5F50;
    /// Cipher DO template wrapping an ECDH decipher request
    pub const CIPHER_DO: u8 = 0xA6;
    /// Public key template
    pub const PUBLIC_KEY: u16 = 0x7F49;
    /// External public key (ephemeral ECDH point)
    pub const EXTERNAL_PUBLIC_KEY: u8 = 0x86;
}
